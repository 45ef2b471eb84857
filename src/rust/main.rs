use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;
use terraclass::{output_bands, vis_params, ClassificationRecipe, ClassifierModel};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recipe document or bare classification model, as JSON
    recipe: PathBuf,

    /// Output bands to pick visualization parameters for
    #[arg(short, long, num_args = 1.., default_value = "class")]
    select: Vec<String>,

    /// Print the classifier expression graph
    #[arg(long)]
    show_classifier: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    terraclass::init_logger();
    let args = Args::parse();

    let start_time = Instant::now();
    info!("Loading recipe from {}", args.recipe.display());
    let recipe = ClassificationRecipe::from_json(&fs::read_to_string(&args.recipe)?)?;
    let classifier_type = recipe.classifier.classifier_type();
    info!(
        "Loaded {} recipe with {} input images, {} legend entries and {} training sources (took {:.2?})",
        classifier_type,
        recipe.images().len(),
        recipe.legend.entries.len(),
        recipe.training_sources().len(),
        start_time.elapsed()
    );

    println!("Output bands:");
    for band in output_bands(classifier_type, &recipe.legend) {
        println!("  {}", band);
    }

    let params = vis_params(&args.select, &recipe.legend)?;
    println!("\nVisualization parameters:");
    println!("{}", serde_json::to_string_pretty(&params)?);

    if args.show_classifier {
        let expr = match recipe.classifier.build()? {
            ClassifierModel::Trainable(expr) | ClassifierModel::PreTrained(expr) => expr,
        };
        println!("\nClassifier:");
        println!("{}", serde_json::to_string_pretty(&expr)?);
    }

    Ok(())
}
