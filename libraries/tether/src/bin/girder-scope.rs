//! Inspector for a file-backed storage directory: lists slots and record
//! counts, and pretty-prints one snapshot when asked.

use tether::storage::{FileBackend, PersistBackend};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <storage-dir> [key]", args[0]);
        eprintln!("\nExample: {} ./girder-data tasks", args[0]);
        std::process::exit(1);
    }

    let backend = match FileBackend::open(&args[1]) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Error opening storage directory '{}': {e}", args[1]);
            std::process::exit(1);
        }
    };

    if let Some(key) = args.get(2) {
        let Some(raw) = backend.load(key) else {
            eprintln!("No slot named '{key}'");
            std::process::exit(1);
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(pretty) => println!("{pretty}"),
                Err(e) => eprintln!("Error formatting snapshot: {e}"),
            },
            Err(e) => {
                eprintln!("Slot '{key}' is not valid JSON ({e}); raw contents:");
                println!("{raw}");
            }
        }
        return;
    }

    println!("GirderScope - storage snapshot inspector");
    println!("========================================");
    println!("Directory: {}", args[1]);
    println!();

    let keys = backend.keys();
    if keys.is_empty() {
        println!("  No slots found");
        return;
    }

    for key in keys {
        let Some(raw) = backend.load(&key) else {
            println!("  {key}: <unreadable>");
            continue;
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(records)) => {
                println!("  {key}: {} record(s), {} bytes", records.len(), raw.len());
            }
            Ok(_) => println!("  {key}: non-list snapshot, {} bytes", raw.len()),
            Err(_) => println!("  {key}: malformed JSON, {} bytes", raw.len()),
        }
    }
}
