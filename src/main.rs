#![allow(non_snake_case)]
use RustedMovCol::Examples::movcol_examples::movcol_examples;

fn main() {
    // 0: Burgers travelling front, 1: heat equation with ns = 4
    let example = 0;
    movcol_examples(example);
}
