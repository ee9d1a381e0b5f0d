use std::path::Path;

use contagion_core::{Dataset, Taxonomy};

pub fn run(input: &str) {
    let taxonomy = Taxonomy::goemotions();
    match Dataset::load(Path::new(input), &taxonomy) {
        Ok(ds) => {
            let depths: Vec<u32> = ds.depths().into_iter().collect();
            println!("{input}: OK");
            println!("  pairs:  {}", ds.len());
            println!("  groups: {}", ds.group_count());
            println!("  depths: {depths:?}");
            println!("  sha256: {}", ds.fingerprint());
        }
        Err(e) => {
            super::report_error(input, &e);
            std::process::exit(1);
        }
    }
}
