use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rollcall_core::{group_by_date, CheckIn, Descriptor, ReferenceImage, StudentRecord};
use rollcall_store::SqliteStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::{spawn_engine, EngineSettings};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition classroom attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a student from a captured face descriptor
    Register {
        /// Student display name
        #[arg(short, long)]
        name: String,
        /// JSON file holding the face descriptor
        #[arg(short, long)]
        descriptor: PathBuf,
        /// Reference photo taken at capture time
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Class to check the new student in to
        #[arg(short, long)]
        class: Option<String>,
    },
    /// Recognize a descriptor and log attendance
    CheckIn {
        /// JSON file holding the observed face descriptor
        #[arg(short, long)]
        descriptor: PathBuf,
        #[arg(short, long)]
        class: Option<String>,
    },
    /// List registered students
    Students {
        #[arg(long)]
        json: bool,
    },
    /// Remove a registered student
    Remove {
        /// Student ID to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<i64>,
        /// Remove every registered student
        #[arg(long)]
        all: bool,
    },
    /// Show attendance grouped by day, newest first
    Log {
        #[arg(short, long)]
        class: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List classes that have attendance records
    Classes,
    /// Delete attendance records for one class, or all of them
    Clear {
        #[arg(short, long)]
        class: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let engine = spawn_engine(
        store,
        EngineSettings {
            threshold: config.match_threshold,
            policy: config.timezone,
        },
    )?;

    match cli.command {
        Commands::Register {
            name,
            descriptor,
            image,
            class,
        } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                bail!("student name must not be empty");
            }
            let descriptor = read_descriptor(&descriptor, &config)?;
            let mut student = StudentRecord::new(name, descriptor, Utc::now());
            if let Some(path) = image {
                student = student.with_image(read_image(&path)?);
            }

            let reg = engine
                .register(student, class.or(config.default_class.clone()))
                .await?;
            let id = reg.student.id.unwrap_or_default();
            println!("Registered {} (id {id})", reg.student.name);
            if let Some(record) = reg.attendance {
                println!("Checked in to {} at {}", record.class_name, record.time);
            }
        }
        Commands::CheckIn { descriptor, class } => {
            let Some(class) = class.or(config.default_class.clone()) else {
                bail!("no class selected: pass --class or set ROLLCALL_CLASS");
            };
            let descriptor = read_descriptor(&descriptor, &config)?;

            match engine.check_in(descriptor, class.clone()).await? {
                CheckIn::NoClass => println!("No class selected"),
                CheckIn::NoMatch => println!("No registered student recognized"),
                CheckIn::AlreadyLogged { student, distance } => println!(
                    "{} already checked in to {class} today (distance {distance:.3})",
                    student.name
                ),
                CheckIn::Logged { record, distance } => println!(
                    "Checked in {} to {class} at {} (distance {distance:.3})",
                    record.student_name, record.time
                ),
            }
        }
        Commands::Students { json } => {
            let students = engine.students().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("No students registered");
            } else {
                for s in &students {
                    println!(
                        "{:>5}  {:<30} registered {}",
                        s.id.unwrap_or_default(),
                        s.name,
                        s.registered_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::Remove { id, all } => {
            if all {
                let removed = engine.remove_all_students().await?;
                println!("Removed {removed} students");
            } else if let Some(id) = id {
                if engine.remove_student(id).await? {
                    println!("Removed student {id}");
                } else {
                    bail!("no student with id {id}");
                }
            }
        }
        Commands::Log { class, json } => {
            let class = class.or(config.default_class.clone());
            let records = engine.attendance(class.clone()).await?;
            let days = group_by_date(&records, config.timezone);
            if json {
                println!("{}", serde_json::to_string_pretty(&days)?);
            } else if days.is_empty() {
                match class {
                    Some(c) => println!("No attendance records for {c} yet"),
                    None => println!("No attendance records yet"),
                }
            } else {
                for day in &days {
                    println!("{}  ({} students)", day.date, day.records.len());
                    for r in &day.records {
                        println!("    {:<30} {:<15} {}", r.student_name, r.class_name, r.time);
                    }
                }
            }
        }
        Commands::Classes => {
            for class in engine.classes().await? {
                println!("{class}");
            }
        }
        Commands::Clear { class } => {
            let removed = engine.clear_attendance(class.clone()).await?;
            match class {
                Some(c) => println!("Cleared {removed} attendance records for {c}"),
                None => println!("Cleared {removed} attendance records"),
            }
        }
        Commands::Config => unreachable!("handled before the store is opened"),
    }

    Ok(())
}

fn read_descriptor(path: &Path, config: &Config) -> Result<Descriptor> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("reading descriptor {}", path.display()))?;
    let descriptor = Descriptor::from_json(&src)
        .with_context(|| format!("parsing descriptor {}", path.display()))?;
    descriptor
        .validate(config.expected_descriptor_len())
        .with_context(|| format!("descriptor {}", path.display()))?;
    Ok(descriptor)
}

fn read_image(path: &Path) -> Result<ReferenceImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognized image", path.display()))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .with_context(|| format!("decoding image {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        width = decoded.width(),
        height = decoded.height(),
        ?format,
        "reference image loaded"
    );
    Ok(ReferenceImage {
        mime: format.to_mime_type().to_string(),
        bytes,
    })
}
