use contagion_core::Taxonomy;

/// Resolve labels given as separate arguments or comma-separated lists.
pub fn run(labels: &[String]) {
    let taxonomy = Taxonomy::goemotions();
    let active = split_labels(labels);
    for label in &active {
        if !taxonomy.fine_labels().iter().any(|f| f.name == *label) {
            eprintln!("note: '{label}' is not a known label, counted as {}", taxonomy.fallback());
        }
    }
    let c = taxonomy.resolve(active.iter().map(String::as_str));
    println!("macro:   {}", c.macro_label);
    println!("valence: {:+.4}", c.valence);
}

fn split_labels(args: &[String]) -> Vec<String> {
    args.iter()
        .flat_map(|a| a.split(','))
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
