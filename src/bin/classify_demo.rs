//! Demo that runs a few sample posts through the classifier and prints the
//! axis results as JSON.

use pulsewatch::classify::ClassifierEngine;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let engine = ClassifierEngine::from_toml()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let samples: Vec<String> = if args.is_empty() {
        [
            "BREAKING: explosions confirmed near the port, officials say",
            "The ministry denied reports of troop movements along the border",
            "According to Reuters, talks are developing and may resume tomorrow",
            "quiet day on the line, nothing to report",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    } else {
        args
    };

    for text in samples {
        let classification = engine.classify(&text);
        println!("{}", text);
        println!("{}", serde_json::to_string_pretty(&classification)?);
        println!();
    }

    Ok(())
}
