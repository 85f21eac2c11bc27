/*!

`reltab` is the command-line front end of the decision engine in
[`reltab_lib`]: it parses proof files of the cat-flavored proof language,
runs the regular (or, for debugging, the local) tableau per goal, and emits
Graphviz artifacts for proofs and counter-examples.

*/

pub mod graphviz;
pub mod parser;
