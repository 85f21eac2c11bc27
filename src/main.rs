use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Instant;

use simple_error::SimpleError;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reltab::{graphviz, parser};
use reltab_lib::{
  assumption,
  literal::print_cube,
  preprocessing,
  regular::RegularTableau,
  stats,
  tableau::Tableau,
};

fn run(arguments: &[String]) -> Result<(), SimpleError> {
  let path = arguments
      .first()
      .ok_or_else(|| SimpleError::new("usage: reltab <proof-file> [infinite]"))?;
  let infinite = arguments.get(1).is_some_and(|mode| mode == "infinite");

  let parsed = parser::parse_file(path)?;
  info!(
    "parser done: {} goal(s), {} assumption(s)",
    parsed.goals.len(),
    assumption::assumption_count()
  );

  for mut goal in parsed.goals {
    info!("goal: {}", print_cube(&goal));
    preprocessing::preprocess(&mut goal);

    if infinite {
      let mut tableau = Tableau::new(&goal);
      let closed = tableau.solve(200);
      info!("Answer: {}", if closed { "True" } else { "False" });
      graphviz::export_local_tableau(&tableau, "infinite.dot")
          .map_err(|error| SimpleError::new(format!("cannot write infinite.dot: {error}")))?;
      continue;
    }

    let start = Instant::now();
    let mut tableau = RegularTableau::new(&goal);
    let provable = tableau.solve();
    info!("duration: {:.3} seconds", start.elapsed().as_secs_f64());

    graphviz::export_regular_tableau(&tableau, "regular.dot")
        .map_err(|error| SimpleError::new(format!("cannot write regular.dot: {error}")))?;
    if !provable {
      let open_leaf = tableau.counterexample().expect("refuted goal without counterexample");
      graphviz::export_counterexample_model(&tableau, open_leaf)
          .map_err(|error| SimpleError::new(format!("cannot write counterexample: {error}")))?;
      graphviz::export_counterexample_path(&tableau, open_leaf)
          .map_err(|error| SimpleError::new(format!("cannot write counterexample: {error}")))?;
    }
  }

  stats::dump();
  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
      .with_target(false)
      .init();

  // With no arguments, read a single whitespace-separated command line from
  // standard input.
  let mut arguments: Vec<String> = std::env::args().skip(1).collect();
  if arguments.is_empty() {
    print!("> ");
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
      eprintln!("cannot read from stdin");
      return ExitCode::FAILURE;
    }
    arguments = line.split_whitespace().map(str::to_string).collect();
  }

  match run(&arguments) {
    Ok(()) => ExitCode::SUCCESS,
    Err(error) => {
      eprintln!("{error}");
      ExitCode::FAILURE
    }
  }
}
