use std::env;
use std::fs::File;
use std::io::{self, BufReader};

use ingest::summarize_reader;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: ingest_cli <path|->");
        std::process::exit(2);
    }

    let path = &args[1];
    let summary = if path == "-" {
        summarize_reader(io::stdin().lock())
    } else {
        let file = File::open(path).unwrap_or_else(|err| {
            eprintln!("failed to open {}: {}", path, err);
            std::process::exit(1);
        });
        summarize_reader(BufReader::new(file))
    };
    let summary = summary.unwrap_or_else(|err| {
        eprintln!("failed to read {}: {}", path, err);
        std::process::exit(1);
    });

    if summary.events == 0 {
        eprintln!("no assistant usage found in {} lines", summary.lines);
        std::process::exit(3);
    }

    println!("lines {}", summary.lines);
    println!("events {}", summary.events);
    println!("input_tokens {}", summary.totals.input_tokens);
    println!("output_tokens {}", summary.totals.output_tokens);
    println!("cache_read_tokens {}", summary.totals.cache_read_tokens);
    println!("cache_creation_tokens {}", summary.totals.cache_creation_tokens);
    println!("total_tokens {}", summary.totals.total());
    for (model, totals) in &summary.models {
        println!(
            "model {} events={} total_tokens={}",
            model,
            totals.event_count,
            totals.tokens.total()
        );
    }
}
