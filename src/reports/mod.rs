use comfy_table::presets::ASCII_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use shakespeare::genome::{Alphabet, Genome};
use shakespeare::optimizer::{GenerationEvent, RunOutcome};
use std::time::Duration;

/// Control characters would wreck the table layout.
fn visible(c: char) -> String {
    match c {
        '\n' => "⏎".to_string(),
        '\r' => "␍".to_string(),
        ' ' => "·".to_string(),
        c if c.is_control() => format!("\\x{:02x}", c as u32),
        c => c.to_string(),
    }
}

pub fn print_progress(ev: &GenerationEvent) {
    let first_line = ev.best_text.lines().next().unwrap_or_default();
    println!(
        "Gen {:6} | Fitness: {:4} | {:.2} gen/s | {}",
        ev.generation, ev.best_fitness, ev.rate, first_line
    );
}

pub fn print_outcome(outcome: &RunOutcome, elapsed: Duration) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let (status, color, event) = match outcome {
        RunOutcome::Converged(ev) => ("Converged", Color::Green, Some(ev)),
        RunOutcome::GenerationLimit(ev) => ("Generation limit", Color::Yellow, Some(ev)),
        RunOutcome::Cancelled { .. } => ("Cancelled", Color::Red, None),
    };

    table.add_row(vec![
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new(status).fg(color),
    ]);
    table.add_row(vec![
        Cell::new("Generations"),
        Cell::new(outcome.generation()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Elapsed"),
        Cell::new(format!("{:.2}s", elapsed.as_secs_f64())).set_alignment(CellAlignment::Right),
    ]);

    if let Some(ev) = event {
        table.add_row(vec![
            Cell::new("Rate"),
            Cell::new(format!("{:.2} gen/s", ev.rate)).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new("Best fitness"),
            Cell::new(ev.best_fitness)
                .fg(Color::Cyan)
                .set_alignment(CellAlignment::Right),
        ]);
    }

    println!("\n=== 🏆 FINAL RESULT ===");
    println!("{}", table);
    if let Some(ev) = event {
        println!("{}", ev.best_text);
    }
}

/// Position-by-position comparison of a candidate with its target.
pub fn print_alignment(genome: &Genome, alphabet: &Alphabet) {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Pos").add_attribute(Attribute::Bold),
        Cell::new("Target"),
        Cell::new("Candidate"),
    ]);

    let mut foreign = 0;
    for (i, (&want, &got)) in genome
        .target()
        .chars()
        .iter()
        .zip(genome.text())
        .enumerate()
    {
        if !alphabet.contains(want) {
            foreign += 1;
        }
        if want == got {
            continue;
        }
        table.add_row(vec![
            Cell::new(i).set_alignment(CellAlignment::Right),
            Cell::new(visible(want)).fg(Color::Green),
            Cell::new(visible(got)).fg(Color::Red),
        ]);
    }

    if genome.fitness() > 0 {
        println!("{}", table);
    }
    println!("Fitness: {} / {} mismatched", genome.fitness(), genome.len());
    if foreign > 0 {
        println!(
            "⚠️  {} target symbols lie outside the alphabet and can never be produced",
            foreign
        );
    }
}
