//! nozomi 命令行工具
//!
//! - `search`：按谓词检索画廊 id，每行一个输出到 stdout，警告输出到 stderr
//! - `gg`：刷新 GG 路由表并打印摘要
//! - `route`：按图片 hash 生成资源地址

use clap::{Args, Parser, Subcommand};
use nozomi_core::{
    predicate_help, FoldStrategy, GgTable, HttpFetcher, ImageFile, SearchEngine, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "nozomi-cli")]
#[command(version)]
#[command(about = "nozomi 命令行工具（画廊检索、GG 路由表）", long_about = None)]
struct Cli {
    /// 日志级别（trace, debug, info, warn, error），RUST_LOG 优先
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 检索画廊 id
    #[command(after_help = search_help())]
    Search(SearchArgs),
    /// 刷新 GG 路由表并打印版本信息
    Gg(ConfigArgs),
    /// 生成图片资源地址（会先刷新 GG 路由表）
    Route(RouteArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// 配置文件（JSON），不指定则使用默认配置
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// 查询词，例如 `tfemale:sole_female lkorean`
    tokens: Vec<String>,

    /// 整条查询字符串（按 shell 规则拆分），与 tokens 互斥
    #[arg(long = "query", conflicts_with = "tokens")]
    query: Option<String>,

    /// 允许 `~` / `|` / `&` 前缀（NOT / OR / AND）
    #[arg(long = "polarity", default_value_t = false)]
    polarity: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// 图片 hash
    hash: String,

    /// 原始文件名（含扩展名）
    name: String,

    /// 画廊 id，用于生成 Referer
    #[arg(long = "id", default_value_t = 0)]
    id: u32,

    /// 图片有 webp 版本
    #[arg(long = "webp", default_value_t = false)]
    webp: bool,

    /// 图片有 avif 版本
    #[arg(long = "avif", default_value_t = false)]
    avif: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

fn search_help() -> String {
    format!("Predicates:\n{}", predicate_help())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let res = match cli.command {
        Commands::Search(args) => run_search(args),
        Commands::Gg(args) => show_gg(args),
        Commands::Route(args) => show_route(args),
    };

    if let Err(e) = res {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn load_settings(args: &ConfigArgs) -> Result<Settings, String> {
    Settings::load_or_default(args.config.as_deref()).map_err(|e| e.to_string())
}

fn run_search(args: SearchArgs) -> Result<(), String> {
    let settings = load_settings(&args.config)?;
    let strategy = if args.polarity {
        FoldStrategy::Polarity
    } else {
        FoldStrategy::Flat
    };
    let engine = SearchEngine::with_http(settings)
        .map_err(|e| format!("初始化 HTTP 客户端失败: {e}"))?
        .with_strategy(strategy);

    let report = match args.query {
        Some(q) => engine.search_str(&q),
        None => engine.search(args.tokens.as_slice()),
    }
    .map_err(|e| format!("检索失败: {e}"))?;

    for w in &report.warnings {
        eprintln!("warning: {w}");
    }
    if report.aborted {
        return Err("检索已取消".to_string());
    }
    for id in &report.ids {
        println!("{id}");
    }
    Ok(())
}

fn load_gg(settings: &Settings) -> Result<GgTable, String> {
    let fetcher = HttpFetcher::new(settings).map_err(|e| format!("初始化 HTTP 客户端失败: {e}"))?;
    let gg = GgTable::new(Arc::new(fetcher), settings);
    gg.update().map_err(|e| format!("获取 gg.js 失败: {e}"))?;
    Ok(gg)
}

fn show_gg(args: ConfigArgs) -> Result<(), String> {
    let settings = load_settings(&args)?;
    let gg = load_gg(&settings)?;
    let snapshot = gg.snapshot();
    println!("version:  {}", snapshot.version);
    println!("revision: {}", snapshot.revision);
    println!("path:     {}", snapshot.path);
    println!("flagged:  {}", snapshot.flagged_count());
    Ok(())
}

fn show_route(args: RouteArgs) -> Result<(), String> {
    let settings = load_settings(&args.config)?;
    let gg = load_gg(&settings)?;
    let image = ImageFile {
        gallery_id: args.id,
        hash: args.hash,
        name: args.name,
        haswebp: args.webp,
        hasavif: args.avif,
    };
    let prefer_alt = args.webp || args.avif;

    let url = image
        .image_url(&gg.snapshot(), &settings, prefer_alt)
        .map_err(|e| e.to_string())?;
    let thumbnail = image.thumbnail_url(&settings).map_err(|e| e.to_string())?;
    println!("image:     https://{url}");
    println!("thumbnail: https://{thumbnail}");
    println!("referer:   {}", image.referer(&settings));
    println!("save as:   {}", image.file_name(prefer_alt));
    Ok(())
}
