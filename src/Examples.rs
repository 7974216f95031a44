//! examples of usage of RustedMovCol
/// moving collocation examples: Burgers front, heat equation
pub mod movcol_examples;
