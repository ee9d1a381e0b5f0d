use contagion_core::Taxonomy;

pub fn run(json: bool) {
    let taxonomy = Taxonomy::goemotions();
    if json {
        match serde_json::to_string_pretty(taxonomy.fine_labels()) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Failed to serialize taxonomy: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Macro categories: {}", taxonomy.macros().join(", "));
    println!("Unknown labels map to '{}' with valence 0\n", taxonomy.fallback());
    println!("  {:<24} {:<16} {:>8}", "label", "macro", "valence");
    for macro_label in taxonomy.macros() {
        for f in taxonomy
            .fine_labels()
            .iter()
            .filter(|f| &f.macro_label == macro_label)
        {
            println!("  {:<24} {:<16} {:>+8.2}", f.name, f.macro_label, f.valence);
        }
    }
}
