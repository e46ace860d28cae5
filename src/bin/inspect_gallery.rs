use anyhow::{Context, Result};
use facetrack::gallery::Gallery;
use std::path::PathBuf;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/gallery.bin"));

    let gallery = Gallery::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;

    println!("Gallery: {}", path.display());
    println!("Entries: {}", gallery.len());
    match gallery.dimension() {
        Some(d) => println!("Embedding dimension: {}", d),
        None => println!("Embedding dimension: (empty)"),
    }

    println!("{:<30} | {:<7}", "Label", "Entries");
    println!("{}", "-".repeat(40));
    for (label, count) in gallery.label_counts() {
        println!("{:<30} | {:<7}", label, count);
    }

    println!();
    println!("{:<5} | {:<30} | {:<8}", "Index", "Label", "Norm");
    println!("{}", "-".repeat(50));
    for (i, entry) in gallery.entries().enumerate() {
        let norm = entry.embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        println!("{:<5} | {:<30} | {:<8.4}", i, entry.label, norm);
    }

    Ok(())
}
