use bedtime_adapters::{
    AdapterError, DirectoryAssetStore, GenerationOrchestrator, HttpProviderFactory,
    PipelineError, PipelineOptions, StoryPackage, StoryPipeline,
};
use bedtime_core::{
    ConfigError, ContentGuard, FrameSize, GuardrailConfigLoader, GuardrailError,
    GuardrailViolation, InferenceMode, LanguageSelection, LogCrateSink, PromptBuilder,
    PromptContext, PromptContextError, PromptError, PromptMode, PromptType, Settings,
    UserProfile,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let settings = Settings::load_or_default(&cli.config)?;

    match cli.command {
        Command::Modes => {
            print_modes();
            Ok(())
        }
        Command::Generate(args) => run_generate(settings, args),
        Command::Check(args) => run_check(&settings, args),
        Command::Sanitize(args) => run_sanitize(&settings, args),
        Command::Prompt(args) => run_prompt(&settings, args),
    }
}

fn print_modes() {
    println!("{:<14} {:<14} {:<34} fallback", "mode", "primary", "chain");
    for mode in InferenceMode::ALL {
        let config = mode.config();
        let chain: Vec<&str> = config.chain.iter().map(|kind| kind.as_str()).collect();
        println!(
            "{:<14} {:<14} {:<34} {}",
            mode.as_str(),
            config.primary.as_str(),
            chain.join(" -> "),
            config.allow_fallback
        );
    }
}

fn run_generate(mut settings: Settings, args: GenerateArgs) -> Result<(), CliError> {
    if let Some(mode) = args.inference_mode {
        settings.inference_mode = mode;
    }
    if args.consent {
        settings.guardrails.parental_consent_recorded = true;
    }
    if settings.guardrails.moderation_enabled {
        warn!("moderation is enabled but no moderation service is configured, skipping AI checks");
    }

    let context = build_context(&settings, &args.context)?;
    let builder = PromptBuilder::new(&settings.prompts)?;
    let guard = content_guard(&settings);
    let factory = Arc::new(HttpProviderFactory::new(settings.providers.clone()));
    let orchestrator = GenerationOrchestrator::from_settings(&settings, factory);
    let assets = Arc::new(DirectoryAssetStore::new(&args.out)?);

    info!(
        "generating in {} mode, assets under {}",
        settings.inference_mode,
        assets.root().display()
    );

    let pipeline = StoryPipeline::new(orchestrator, builder, guard, settings.guardrails.clone())
        .with_assets(assets.clone())
        .with_options(PipelineOptions {
            frame_count: args.frames,
            frame_size: FrameSize::new(args.width, args.height),
            narrate: !args.no_narration,
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let package = runtime.block_on(pipeline.run(&context))?;

    let story_path = assets.root().join("story.txt");
    fs::write(&story_path, &package.draft.text).map_err(|source| CliError::Io {
        path: story_path.clone(),
        source,
    })?;
    print_package(&package, &story_path);
    Ok(())
}

fn print_package(package: &StoryPackage, story_path: &Path) {
    println!(
        "Story by {} ({}), {} attempt(s): {}",
        package.kind,
        package.draft.model,
        package.attempts,
        story_path.display()
    );
    match &package.narration_url {
        Some(url) => println!("Narration: {url}"),
        None => println!("Narration: unavailable"),
    }
    for url in &package.frame_urls {
        println!("Frame: {url}");
    }
    if package.placeholders > 0 {
        println!("Placeholder frames: {}", package.placeholders);
    }
    print_violations(&package.violations);
}

fn run_check(settings: &Settings, args: CheckArgs) -> Result<(), CliError> {
    let profile = args.profile.as_deref().map(load_profile).transpose()?;
    let guard = content_guard(settings);
    let child_mode = settings.guardrails.child_mode;
    let filter_level = settings.guardrails.filter_level;

    let violations = if args.video {
        guard.check_video_prompt(&args.text, profile.as_ref(), child_mode, filter_level)
    } else {
        guard.check_story(&args.text, profile.as_ref(), child_mode, filter_level)
    };
    if violations.is_empty() {
        println!("No issues found.");
    }
    print_violations(&violations);
    Ok(())
}

fn run_sanitize(settings: &Settings, args: SanitizeArgs) -> Result<(), CliError> {
    let profile = args.profile.as_deref().map(load_profile).transpose()?;
    let sanitizer = content_guard(settings).sanitizer(profile.as_ref());
    let sanitized = sanitizer.enforce(&args.text, args.kind.into())?;
    println!("{}", sanitized.text);
    print_violations(&sanitized.rewrites);
    Ok(())
}

fn run_prompt(settings: &Settings, args: PromptArgs) -> Result<(), CliError> {
    let context = build_context(settings, &args.context)?;
    let builder = PromptBuilder::new(&settings.prompts)?;

    println!("{}", builder.story_prompt(&context)?);
    if let Some(scene) = args.scene.as_deref() {
        println!();
        println!("{}", builder.visual_prompt(&context, scene)?);
    }
    Ok(())
}

fn content_guard(settings: &Settings) -> ContentGuard {
    let loader = GuardrailConfigLoader::from_optional_path(
        settings.guardrails.config_path.as_deref(),
        LogCrateSink::shared(),
    );
    ContentGuard::new(Arc::new(loader), settings.guardrails.safety_mode)
        .with_sink(LogCrateSink::shared())
}

fn build_context(settings: &Settings, args: &ContextArgs) -> Result<PromptContext, CliError> {
    let language = match args.second_language.as_deref() {
        Some(second) => LanguageSelection::bilingual(&args.language, second)?,
        None => LanguageSelection::single(&args.language)?,
    };

    let mut context = PromptContext::new(args.prompt.clone(), args.theme.clone())
        .with_mode(args.mode.unwrap_or(settings.prompts.mode))
        .with_language(language);
    if let Some(words) = args.words {
        context = context.with_target_words(words);
    }
    if let Some(age) = args.age {
        context = context.with_child_age(age);
    }
    if let Some(path) = args.profile.as_deref() {
        context = context.with_profile(load_profile(path)?);
    }
    Ok(context)
}

fn load_profile(path: &Path) -> Result<UserProfile, CliError> {
    let data = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| CliError::Profile {
        path: path.to_path_buf(),
        source,
    })
}

fn print_violations(violations: &[GuardrailViolation]) {
    for violation in violations {
        println!("  {violation}");
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("settings error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid story request: {0}")]
    Context(#[from] PromptContextError),
    #[error("prompt template error: {0}")]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),
    #[error("adapter setup failed: {0}")]
    Adapter(#[from] AdapterError),
    #[error("story generation failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to start async runtime: {0}")]
    Runtime(io::Error),
    #[error("failed to access `{path}`: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid profile `{path}`: {source}")]
    Profile {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Parser)]
#[command(
    name = "bedtime",
    version,
    about = "Guarded bedtime-story generation across cloud, server and phone providers"
)]
struct Cli {
    /// Settings file (JSON); defaults are used when it does not exist
    #[arg(long, global = true, default_value = "settings.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every inference mode with its provider chain
    Modes,
    /// Generate a story with narration and frames
    Generate(GenerateArgs),
    /// Run the advisory content checks on a text
    Check(CheckArgs),
    /// Show what the prompt sanitizer sends for a text
    Sanitize(SanitizeArgs),
    /// Print the story prompt (and optionally a scene prompt) without calling a model
    Prompt(PromptArgs),
}

#[derive(Args)]
struct ContextArgs {
    /// Seed idea for the story
    #[arg(long, value_name = "TEXT")]
    prompt: String,
    /// Setting or theme, e.g. "forest"
    #[arg(long, value_name = "TEXT", default_value = "cozy bedroom")]
    theme: String,
    /// Target story length in words
    #[arg(long, value_name = "N")]
    words: Option<u32>,
    /// Listener age; younger ages shorten the story
    #[arg(long, value_name = "YEARS")]
    age: Option<u8>,
    /// Language code of the story
    #[arg(long, default_value = "en")]
    language: String,
    /// Second language code for bilingual stories
    #[arg(long, value_name = "CODE")]
    second_language: Option<String>,
    /// Prompt mode, overriding the settings file
    #[arg(long)]
    mode: Option<PromptMode>,
    /// Listener profile (JSON)
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    context: ContextArgs,
    /// Inference mode, overriding the settings file
    #[arg(long, value_name = "MODE")]
    inference_mode: Option<InferenceMode>,
    /// Output directory for the story, audio and frames
    #[arg(long, value_name = "DIR", default_value = "stories")]
    out: PathBuf,
    /// Maximum number of illustrated frames
    #[arg(long, value_name = "N", default_value_t = 3)]
    frames: usize,
    #[arg(long, default_value_t = 1024)]
    width: u32,
    #[arg(long, default_value_t = 1024)]
    height: u32,
    /// Skip narration
    #[arg(long)]
    no_narration: bool,
    /// Record parental consent for this child-mode run
    #[arg(long)]
    consent: bool,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long, value_name = "TEXT")]
    text: String,
    /// Apply the video prompt rules (personal-information checks in child mode)
    #[arg(long)]
    video: bool,
    /// Listener profile (JSON) used for profile-specific rules
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct SanitizeArgs {
    #[arg(long, value_name = "TEXT")]
    text: String,
    #[arg(long = "type", value_enum, default_value_t = PromptKind::Story)]
    kind: PromptKind,
    /// Listener profile (JSON) whose banned terms are added to the gate
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,
}

#[derive(Args)]
struct PromptArgs {
    #[command(flatten)]
    context: ContextArgs,
    /// Scene text to turn into an image prompt
    #[arg(long, value_name = "TEXT")]
    scene: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PromptKind {
    Story,
    Narration,
    Image,
}

impl From<PromptKind> for PromptType {
    fn from(kind: PromptKind) -> Self {
        match kind {
            PromptKind::Story => PromptType::Story,
            PromptKind::Narration => PromptType::Narration,
            PromptKind::Image => PromptType::Image,
        }
    }
}
