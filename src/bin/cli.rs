#![cfg(not(tarpaulin_include))]

use std::env;
use std::fs;

use task_tracker::config::Settings;
use task_tracker::connector::Connector;
use task_tracker::downloader::{log_to_csv, tasks_to_csv};
use task_tracker::store::TaskStore;
use task_tracker::task::format_date;

fn usage(program: &str) {
    eprintln!("Usage: {} <command>", program);
    eprintln!("Commands:");
    eprintln!("  list            Print every task");
    eprintln!("  export <file>   Write the task table as CSV");
    eprintln!("  logs [file]     Print or write the audit log as CSV");
    eprintln!("  next-id         Print the next free id");
    eprintln!("  seed            Overwrite the sheet with the sample tasks");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        return Ok(());
    }

    let settings = Settings::from_env()?;
    let store = TaskStore::new(Connector::from_settings(&settings))
        .with_verify_delay(settings.verify_delay);

    match args[1].as_str() {
        "list" => {
            let outcome = store.load_tasks().await?;
            if let Some(reason) = &outcome.reset {
                eprintln!("Sheet reinitialised: {}", reason);
            }
            for task in &outcome.tasks {
                println!(
                    "#{:<4} {:<40} {:<10} {:<20} {:>3}%  {}",
                    task.id,
                    task.title,
                    task.assignee,
                    task.status,
                    task.progress,
                    format_date(task.due_date)
                );
            }
        }
        "export" => {
            let Some(path) = args.get(2) else {
                usage(&args[0]);
                return Ok(());
            };
            let outcome = store.load_tasks().await?;
            fs::write(path, tasks_to_csv(&outcome.tasks))?;
            println!("Wrote {} tasks to {}", outcome.tasks.len(), path);
        }
        "logs" => {
            let csv = log_to_csv(&store.log_entries().await?);
            match args.get(2) {
                Some(path) => fs::write(path, csv)?,
                None => print!("{}", csv),
            }
        }
        "next-id" => println!("{}", store.next_id().await?),
        "seed" => {
            let tasks = store.seed().await?;
            println!("Wrote {} sample tasks", tasks.len());
        }
        other => {
            eprintln!("Unknown command: {}", other);
            usage(&args[0]);
        }
    }

    Ok(())
}
