//! Identify command - test a file name against the archive grammar.

use crate::artifact;

/// Print the parsed identity. Returns `false` when the name is not an
/// archive name.
pub fn run(file_name: &str) -> bool {
    match artifact::identify(file_name) {
        Some(identity) => {
            println!("name:      {}", identity.name());
            println!("version:   {}", identity.version());
            println!("reference: {}", identity.reference());
            true
        }
        None => {
            eprintln!("'{file_name}' does not match <name>-<version>.tar");
            false
        }
    }
}
