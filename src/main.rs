//! 命令行入口：读取 HTML 文件，运行一轮标注，输出带译文的 HTML

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, Level};

use interlinear::config::{load_engine_config, ConfigManager};
use interlinear::env::{self, EnvVar};
use interlinear::settings::keys;
use interlinear::translator::GoogleTranslator;
use interlinear::{
    AdapterCatalogue, Document, Engine, EngineError, MemorySettingsStore, SettingsSnapshot,
};

#[derive(Parser, Debug)]
#[command(name = "interlinear", version, about = "Annotate an HTML document with translations")]
struct Cli {
    /// HTML file to annotate
    #[arg(required_unless_present = "env_docs")]
    input: Option<PathBuf>,

    /// Hostname used to select the site adapter
    #[arg(long, required_unless_present = "env_docs")]
    host: Option<String>,

    /// Target language (defaults to INTERLINEAR_TARGET_LANG or zh-CN)
    #[arg(long)]
    target_lang: Option<String>,

    /// Annotation theme
    #[arg(long, default_value = "dark")]
    theme: String,

    /// Enable the universal adapter for hosts without a site adapter
    #[arg(long)]
    universal: bool,

    /// JSON adapter catalogue replacing the built-in one
    #[arg(long)]
    adapters: Option<PathBuf>,

    /// Engine configuration file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the annotated document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Charset of the input document
    #[arg(long, default_value = "utf-8")]
    charset: String,

    /// Print the supported environment variables and exit
    #[arg(long)]
    env_docs: bool,
}

fn init_logging() {
    let level = match env::core::LogLevel::get().as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    };
    let no_color = env::core::NoColor::get_or_default(false);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(!no_color)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    if cli.env_docs {
        print!("{}", env::generate_env_docs());
        return Ok(());
    }
    let (Some(input), Some(host)) = (cli.input.as_ref(), cli.host.as_deref()) else {
        return Err("缺少输入文件或 --host".into());
    };

    let config = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?.into_config(),
        None => load_engine_config(),
    };

    let catalogue = match &cli.adapters {
        Some(path) => AdapterCatalogue::from_json(&fs::read_to_string(path)?)?,
        None => AdapterCatalogue::builtin(),
    };

    let target_lang = match cli.target_lang {
        Some(lang) => lang,
        None => env::engine::TargetLang::get().map_err(EngineError::from)?,
    };
    let universal = cli.universal || env::UniversalAdapter::get_or_default(false);

    let mut settings = SettingsSnapshot::new();
    settings.insert(keys::ENABLED.to_string(), Value::Bool(true));
    settings.insert(keys::TARGET_LANG.to_string(), json!(target_lang));
    settings.insert(keys::THEME.to_string(), json!(cli.theme));
    settings.insert(keys::UNIVERSAL_ADAPTER.to_string(), Value::Bool(universal));

    let data = fs::read(input)?;
    let document = Rc::new(Document::from_bytes(&data, &cli.charset));
    let translator = Rc::new(GoogleTranslator::from_config(&config)?);
    let store = Rc::new(MemorySettingsStore::with_values(settings));

    let engine = Engine::create(document, host, translator, store, &catalogue, config).await?;
    let report = engine.annotate_pass().await;
    info!(
        "{}: {} 个候选元素，插入 {} 条译文",
        input.display(),
        report.candidates,
        report.annotated
    );

    let html = engine.document().serialize()?;
    match &cli.output {
        Some(path) => fs::write(path, html)?,
        None => io::stdout().write_all(html.as_bytes())?,
    }

    Ok(())
}
