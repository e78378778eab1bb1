use std::env;
use std::fs;
use std::process;

use runevm::RuneVm;

fn main() {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("Rune interpreter v{}", env!("CARGO_PKG_VERSION"));
        eprintln!("  USAGE: rune <sourcefile>");
        process::exit(1);
    };

    let Ok(source) = fs::read_to_string(&path) else {
        eprintln!("ERROR: Can't find source file '{path}'.");
        process::exit(1);
    };

    let mut vm = RuneVm::new();
    if let Err(error) = vm.run(&source, &path) {
        eprintln!("{}", error.render());
        process::exit(1);
    }
}
