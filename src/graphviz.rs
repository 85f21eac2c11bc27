/*!

Graphviz emission for the proof artifacts. All output lands in `./output/`:

 - `regular.dot` — the regular-tableau DAG (green = closed, dotted grey =
   unreachable, red = reachability-tree / counter-example edges);
 - `infinite.dot` — the local tableau tree;
 - `counterexampleModel.dot` — the witness model with saturation costs;
 - `counterexamplePath.dot` — the failing branch renamed into the root
   namespace.

The engine only exposes walk routines; every piece of formatting lives here.

*/

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use reltab_lib::{
  literal::Literal,
  model::{saturate_model, Model},
  regular::{node::RegularNodeId, RegularTableau},
  tableau::{node::NodeId, Tableau},
};

const OUTPUT_DIRECTORY: &str = "./output";

fn write_output(filename: &str, contents: &str) -> io::Result<()> {
  fs::create_dir_all(OUTPUT_DIRECTORY)?;
  fs::write(Path::new(OUTPUT_DIRECTORY).join(filename), contents)
}

fn escape(text: &str) -> String {
  text.replace('\\', "\\\\").replace('"', "\\\"")
}

// ================== Local tableau ==================

pub fn export_local_tableau(tableau: &Tableau, filename: &str) -> io::Result<()> {
  let mut output = String::from("graph {\nnode[shape=\"plaintext\"]\n");
  if let Some(root) = tableau.root() {
    local_node_to_dot(tableau, root, &mut output);
  }
  output.push_str("}\n");
  write_output(filename, &output)
}

fn local_node_to_dot(tableau: &Tableau, id: NodeId, output: &mut String) {
  let node = tableau.node(id);
  let _ = write!(output, "N{}[label=\"{}\"", id.raw(), escape(&node.literal().to_string()));
  if tableau.is_closed(id) {
    output.push_str(", fontcolor=green");
  }
  output.push_str("];\n");
  for &child in node.children() {
    local_node_to_dot(tableau, child, output);
    let _ = writeln!(output, "N{} -- N{};", id.raw(), child.raw());
  }
}

// ================== Regular tableau ==================

pub fn export_regular_tableau(tableau: &RegularTableau, filename: &str) -> io::Result<()> {
  let mut output = String::from("digraph {\nnode[shape=\"box\"]\n");

  for &root in tableau.roots() {
    let _ = writeln!(output, "root -> N{};", root.raw());
  }
  for id in tableau.node_ids() {
    regular_node_to_dot(tableau, id, &mut output);
  }

  output.push_str("}\n");
  write_output(filename, &output)
}

fn cube_label(cube: &[Literal]) -> String {
  let mut label = String::new();
  for literal in cube {
    label.push_str(&escape(&literal.to_string()));
    label.push_str("\\n");
  }
  label
}

fn renaming_tooltip(renaming: &reltab_lib::term::renaming::Renaming) -> String {
  let mut tooltip = String::new();
  for &(from, to) in renaming.mapping() {
    let _ = write!(tooltip, "{from} -> {to}\\n");
  }
  tooltip
}

fn regular_node_to_dot(tableau: &RegularTableau, id: RegularNodeId, output: &mut String) {
  let node = tableau.node(id);
  let _ = write!(output, "N{}[label=\"{}\"", id.raw(), cube_label(node.cube()));
  if node.is_closed() {
    output.push_str(", color=green, fontcolor=green");
  } else if !tableau.is_reachable_from_roots(id) {
    output.push_str(", style=dotted, fontcolor=grey");
  }
  output.push_str("];\n");

  for &child in node.children() {
    let label = tableau.label_for_child(id, child);
    let _ = write!(output, "N{} -> N{}[", id.raw(), child.raw());
    if tableau.node(child).reachability_tree_parent() == Some(id) {
      output.push_str("color=\"red\", ");
    }
    if !tableau.is_reachable_from_roots(id) {
      output.push_str("style=dotted, color=\"grey\", ");
    }
    let _ = writeln!(output, "tooltip=\"{}\"];", renaming_tooltip(label));
  }
  for &epsilon_child in node.epsilon_children() {
    let label = &tableau.node(epsilon_child).epsilon_parents()[&id];
    let _ = writeln!(
      output,
      "N{} -> N{}[color=\"grey\", tooltip=\"{}\"];",
      id.raw(),
      epsilon_child.raw(),
      renaming_tooltip(label)
    );
  }
}

// ================== Counter-example artifacts ==================

/// Emits the witness model of the open leaf, saturated under the assumption
/// store so the tooltips show the justification costs.
pub fn export_counterexample_model(
  tableau: &RegularTableau,
  open_leaf: RegularNodeId,
) -> io::Result<()> {
  let cube = tableau.model_cube(open_leaf);
  let mut model = Model::new(&cube);
  saturate_model(&mut model);

  let mut output = String::from("digraph { node[shape=\"circle\",margin=0]\n");

  for event in model.events().iter() {
    let mut memberships = String::new();
    for (name, value) in model.base_sets() {
      if value.events.contains(&event) {
        let _ = write!(memberships, "{name} ");
      }
    }
    let mut class = String::new();
    for class_event in model.equivalence_class(event) {
      let _ = write!(class, "{class_event} ");
    }
    let _ = writeln!(
      output,
      "N{event}[label = \"{memberships}\", tooltip=\"event: {event}\\nequivalence class: {class}\"];"
    );
  }

  for (name, value) in model.base_relations() {
    for &(from, to) in &value.pairs {
      let (id_cost, base_cost) = value.costs[&(from, to)];
      let _ = writeln!(
        output,
        "N{from} -> N{to}[label = \"{name}\", tooltip=\"#id sat: {id_cost}\\n#base sat: {base_cost}\"];"
      );
    }
  }

  output.push_str("}\n");
  write_output("counterexampleModel.dot", &output)
}

/// Emits the failing branch: the cubes along the reachability-tree ancestry
/// of the open leaf, renamed into the root's namespace.
pub fn export_counterexample_path(
  tableau: &RegularTableau,
  open_leaf: RegularNodeId,
) -> io::Result<()> {
  let mut output = String::from("digraph {\nnode[shape=\"box\"]\n");

  let mut branch: Vec<String> = Vec::new();
  let mut cursor = Some(open_leaf);
  while let Some(current) = cursor {
    let renaming = tableau.root_renaming(current);
    let mut cube = tableau.node(current).cube().clone();
    for literal in cube.iter_mut() {
      *literal = literal.renamed(&renaming);
    }
    cube.sort();
    branch.push(cube_label(&cube));
    cursor = tableau.node(current).reachability_tree_parent();
  }

  // Root first, leaf last, red-linked from the root marker.
  branch.reverse();
  for (index, label) in branch.iter().enumerate() {
    let _ = writeln!(output, "P{index}[label=\"{label}\"];");
    if index == 0 {
      let _ = writeln!(output, "root -> P0[color=\"red\"];");
    } else {
      let _ = writeln!(output, "P{} -> P{}[color=\"red\"];", index - 1, index);
    }
  }

  output.push_str("}\n");
  write_output("counterexamplePath.dot", &output)
}
