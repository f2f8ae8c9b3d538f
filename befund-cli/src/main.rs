mod config;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use befund_core::generation::{build_report_prompt, parse_generated_report};
use befund_core::html::html_to_plain_text;
use befund_core::models::{default_macros, ClinicalData, Template};
use befund_core::store::{
    load_corrections, save_corrections, seed_templates, JsonTemplateStore, TemplateStore,
};
use befund_core::{
    compose_fallback_report, default_corrections, diff_segments, process_report, rank_templates,
    CorrectionEntry,
    GeneratedReport, GenerationError, GenerationRequest, ModelMode, ReportGenerator,
    TranscriptNormalizer,
};
use config::Config;

/// Draft radiology reports from dictation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.befundtool/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Template file, overrides the config
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Dictionary file, overrides the config
    #[arg(long, global = true)]
    corrections: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct InputArgs {
    /// Read from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct ReportArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Template id; picked from the transcript when omitted
    #[arg(short, long)]
    template: Option<String>,

    /// Clinical field as key=value (e.g. indication="Fieber")
    #[arg(short, long = "clinical", value_parser = parse_key_value)]
    clinical: Vec<(String, String)>,

    /// Normalize the transcript before use
    #[arg(long)]
    normalize: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize dictated text (whitespace, spoken punctuation, dictionary)
    Normalize {
        #[command(flatten)]
        input: InputArgs,

        /// Skip the correction dictionary
        #[arg(long)]
        no_corrections: bool,
    },
    /// Rank templates against a transcript
    Match {
        #[command(flatten)]
        input: InputArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Highlight what a revised text adds to a baseline
    Diff {
        /// Baseline text file
        #[arg(long)]
        baseline: PathBuf,

        /// Revised text file
        #[arg(long)]
        revised: PathBuf,

        /// Print segments as JSON instead of rendered markup
        #[arg(long)]
        json: bool,
    },
    /// Compose a report without a model
    Compose {
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Compose a report from a saved model reply, falling back when it is invalid
    Render {
        #[command(flatten)]
        report: ReportArgs,

        /// File holding the raw model reply
        #[arg(long)]
        reply: PathBuf,

        /// Print the whole outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the generation prompt for a transcript
    Prompt {
        #[command(flatten)]
        report: ReportArgs,

        /// Model class requested
        #[arg(long, value_enum, default_value = "standard")]
        mode: CliModelMode,
    },
    /// List the available templates
    Templates {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the text macros offered for dictation
    Macros {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Convert a rendered report to plain text
    Plain {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Write the config, templates and dictionary files of a fresh installation
    Init {
        /// Overwrite files that already exist
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliModelMode {
    Standard,
    Expert,
}

impl From<CliModelMode> for ModelMode {
    fn from(mode: CliModelMode) -> Self {
        match mode {
            CliModelMode::Standard => ModelMode::Standard,
            CliModelMode::Expert => ModelMode::Expert,
        }
    }
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}

/// Replays a model reply captured earlier
struct ReplayGenerator {
    reply: String,
}

impl ReportGenerator for ReplayGenerator {
    fn generate(&self, _request: &GenerationRequest) -> std::result::Result<GeneratedReport, GenerationError> {
        if self.reply.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(parse_generated_report(&self.reply)?)
    }
}

/// Resolved settings for one run
struct Settings {
    config_path: Option<PathBuf>,
    templates_path: PathBuf,
    corrections_path: PathBuf,
    use_default_corrections: bool,
}

impl Settings {
    fn new(args: &Args) -> Result<Self> {
        let config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(),
        };
        let templates_path = match &args.templates {
            Some(path) => path.clone(),
            None => config.templates_path()?,
        };
        let corrections_path = match &args.corrections {
            Some(path) => path.clone(),
            None => config.corrections_path()?,
        };
        Ok(Self {
            config_path: args.config.clone(),
            templates_path,
            corrections_path,
            use_default_corrections: config.use_default_corrections,
        })
    }

    fn templates(&self) -> Result<Vec<Template>> {
        JsonTemplateStore::new(&self.templates_path)
            .load()
            .with_context(|| format!("Failed to load templates from {:?}", self.templates_path))
    }

    fn corrections(&self) -> Result<Vec<CorrectionEntry>> {
        if !self.corrections_path.exists() && !self.use_default_corrections {
            return Ok(Vec::new());
        }
        load_corrections(&self.corrections_path)
            .with_context(|| format!("Failed to load dictionary from {:?}", self.corrections_path))
    }

    fn normalizer(&self) -> Result<TranscriptNormalizer> {
        Ok(TranscriptNormalizer::new(&self.corrections()?))
    }

    /// Write default files, skipping existing ones unless `force` is set.
    /// Returns the paths written.
    fn init(&self, force: bool) -> Result<Vec<PathBuf>> {
        let config_path = match &self.config_path {
            Some(path) => path.clone(),
            None => Config::default_config_path()?,
        };
        let mut written = Vec::new();

        if force || !config_path.exists() {
            let config = Config {
                templates_path: Some(self.templates_path.clone()),
                corrections_path: Some(self.corrections_path.clone()),
                use_default_corrections: self.use_default_corrections,
                ..Default::default()
            };
            config.save(&config_path)?;
            written.push(config_path);
        }

        if force || !self.templates_path.exists() {
            if self.templates_path.exists() {
                std::fs::remove_file(&self.templates_path)
                    .with_context(|| format!("Failed to replace {:?}", self.templates_path))?;
            }
            // Saving into a missing file starts from the seed set
            let store = JsonTemplateStore::new(&self.templates_path);
            for template in seed_templates() {
                store.save(template)?;
            }
            written.push(self.templates_path.clone());
        }

        if force || !self.corrections_path.exists() {
            save_corrections(&self.corrections_path, &default_corrections())?;
            written.push(self.corrections_path.clone());
        }

        Ok(written)
    }

    /// Transcript, chosen template and clinical data for a report command
    fn report_request(&self, args: &ReportArgs, model_mode: ModelMode) -> Result<GenerationRequest> {
        let mut transcript = read_input(args.input.input.as_deref())?;
        if args.normalize {
            transcript = self.normalizer()?.normalize(&transcript);
        }

        let templates = self.templates()?;
        let template = match &args.template {
            Some(id) => templates
                .iter()
                .find(|t| &t.id == id || t.name.eq_ignore_ascii_case(id))
                .with_context(|| format!("Unknown template '{}'", id))?,
            None => match rank_templates(&templates, &transcript).first() {
                Some(top) => {
                    info!(
                        "Auto-selected template '{}' (score {}, {} confidence)",
                        top.template.name,
                        top.score,
                        top.confidence.as_str()
                    );
                    top.template
                }
                None => bail!("No template matches the transcript; pass --template"),
            },
        };

        let clinical_data: ClinicalData = args.clinical.iter().cloned().collect();
        Ok(GenerationRequest {
            template_name: template.name.clone(),
            baseline: template.normal_befund_text.clone(),
            clinical_data,
            transcript,
            model_mode,
        })
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {:?}", path)),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr so stdout only carries results
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = Settings::new(&args)?;
    debug!("Templates: {:?}", ctx.templates_path);
    debug!("Dictionary: {:?}", ctx.corrections_path);

    match &args.command {
        Command::Normalize { input, no_corrections } => {
            let text = read_input(input.input.as_deref())?;
            let normalizer = if *no_corrections {
                TranscriptNormalizer::default()
            } else {
                ctx.normalizer()?
            };
            println!("{}", normalizer.normalize(&text));
        }
        Command::Match { input, json } => {
            let text = read_input(input.input.as_deref())?;
            let templates = ctx.templates()?;
            let ranking = rank_templates(&templates, &text);
            if *json {
                println!("{}", serde_json::to_string_pretty(&ranking)?);
            } else if ranking.is_empty() {
                eprintln!("No template matches.");
            } else {
                for score in &ranking {
                    println!(
                        "{:>3}  {:<6}  {}  ({})",
                        score.score,
                        score.confidence.as_str(),
                        score.template.name,
                        score.template.id
                    );
                }
            }
        }
        Command::Diff { baseline, revised, json } => {
            let baseline = read_file(baseline)?;
            let revised = read_file(revised)?;
            if *json {
                let segments = diff_segments(&baseline, &revised);
                println!("{}", serde_json::to_string_pretty(&segments)?);
            } else {
                println!("{}", befund_core::highlight_differences(&baseline, &revised));
            }
        }
        Command::Compose { report } => {
            let request = ctx.report_request(report, ModelMode::Standard)?;
            let composed = compose_fallback_report(
                &request.template_name,
                &request.baseline,
                &request.clinical_data,
                &request.transcript,
            );
            println!("{}", composed.html);
        }
        Command::Render { report, reply, json } => {
            let request = ctx.report_request(report, ModelMode::Standard)?;
            let generator = ReplayGenerator {
                reply: read_file(reply)?,
            };
            let outcome = process_report(&request, Some(&generator));
            if *json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                if let Some(reason) = &outcome.fallback_reason {
                    eprintln!("Model reply rejected, used fallback: {}", reason);
                }
                println!("{}", outcome.report.html);
            }
        }
        Command::Prompt { report, mode } => {
            let request = ctx.report_request(report, (*mode).into())?;
            let (system, user) = build_report_prompt(&request);
            println!("=== SYSTEM ===\n{}\n\n=== USER ===\n{}", system, user);
        }
        Command::Templates { json } => {
            let templates = ctx.templates()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&templates)?);
            } else {
                for template in &templates {
                    println!(
                        "{:<20}  {:<16}  {}",
                        template.id,
                        template.name,
                        template.keywords.join(", ")
                    );
                }
            }
        }
        Command::Macros { json } => {
            let macros = default_macros();
            if *json {
                println!("{}", serde_json::to_string_pretty(&macros)?);
            } else {
                for m in &macros {
                    println!("{:<20}  {}", m.title, m.text);
                }
            }
        }
        Command::Plain { input } => {
            let html = read_input(input.input.as_deref())?;
            println!("{}", html_to_plain_text(&html));
        }
        Command::Init { force } => {
            let written = ctx.init(*force)?;
            if written.is_empty() {
                eprintln!("Nothing to do, all files exist (use --force to overwrite).");
            }
            for path in &written {
                info!("Wrote {:?}", path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            config_path: Some(dir.join("config.json")),
            templates_path: dir.join("templates.json"),
            corrections_path: dir.join("corrections.json"),
            use_default_corrections: true,
        }
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("indication=Fieber = hoch").unwrap(),
            ("indication".to_string(), "Fieber = hoch".to_string())
        );
        assert!(parse_key_value("indication").is_err());
    }

    #[test]
    fn test_replay_generator() {
        let request = GenerationRequest::default();
        let empty = ReplayGenerator { reply: " ".to_string() };
        assert!(matches!(empty.generate(&request), Err(GenerationError::EmptyResponse)));

        let valid = ReplayGenerator {
            reply: r#"{"revisedBefundText": "a", "beurteilungText": "b"}"#.to_string(),
        };
        assert!(valid.generate(&request).is_ok());
    }

    #[test]
    fn test_parse_render_args() {
        let args = Args::parse_from([
            "befund", "render", "--reply", "reply.json", "-t", "tpl-ct-abdomen", "-c", "technik=nativ",
        ]);
        match args.command {
            Command::Render { report, reply, .. } => {
                assert_eq!(reply, PathBuf::from("reply.json"));
                assert_eq!(report.template.as_deref(), Some("tpl-ct-abdomen"));
                assert_eq!(report.clinical, vec![("technik".to_string(), "nativ".to_string())]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_init_and_macros() {
        let args = Args::parse_from(["befund", "--config", "/tmp/b/config.json", "init", "--force"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/b/config.json")));
        assert!(matches!(args.command, Command::Init { force: true }));

        let args = Args::parse_from(["befund", "macros", "--json"]);
        assert!(matches!(args.command, Command::Macros { json: true }));
    }

    #[test]
    fn test_init_writes_fresh_installation() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());

        let written = settings.init(false).unwrap();
        assert_eq!(written.len(), 3);

        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.templates_path, Some(dir.path().join("templates.json")));
        assert_eq!(settings.templates().unwrap().len(), seed_templates().len());
        assert_eq!(settings.corrections().unwrap(), default_corrections());
    }

    #[test]
    fn test_init_keeps_existing_files_unless_forced() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(dir.path());
        std::fs::write(&settings.corrections_path, "[]").unwrap();

        let written = settings.init(false).unwrap();
        assert!(!written.contains(&settings.corrections_path));
        assert!(settings.corrections().unwrap().is_empty());
        assert!(settings.init(false).unwrap().is_empty());

        let written = settings.init(true).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(settings.corrections().unwrap(), default_corrections());
        assert_eq!(settings.templates().unwrap().len(), seed_templates().len());
    }
}
