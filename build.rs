fn main() {
  // Generates the parser from src/parser/logic.lalrpop at build time.
  lalrpop::process_root().unwrap();
}
