//! 本地卡片导出工具：
//! - 加载内容目录（文案 / 模板 / 屏蔽词）
//! - 按文案 id、自定义消息或语气 + 关键词挑选文案
//! - 渲染卡片并导出 PNG / SVG / data URL 到文件或标准输出

use std::env;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use valentine_backend::config::AppConfig;
use valentine_backend::features::content::{SelectionQuery, Tone, select_text};
use valentine_backend::features::image::{
    AssetFetcher, CardExporter, CardInput, CardSize, ExportOptions, render_card,
};
use valentine_backend::features::moderation::MAX_LENGTHS;
use valentine_backend::features::moderation::validation::{
    FormData, sanitize_input_with, validate_form_data_with,
};
use valentine_backend::http::build_image_client;
use valentine_backend::startup::content_loader::{load_blocklist, load_content_library};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Png,
    Svg,
    DataUrl,
}

#[derive(Debug, Clone)]
struct Args {
    help: bool,
    config: Option<PathBuf>,
    content_dir: Option<PathBuf>,
    public_dir: Option<PathBuf>,
    template: Option<String>,
    to: Option<String>,
    from: Option<String>,
    message: Option<String>,
    text_id: Option<String>,
    tone: Option<Tone>,
    keywords: Option<String>,
    image: Option<String>,
    size: CardSize,
    scale: f32,
    format: OutputFormat,
    out: Option<PathBuf>,
}

#[derive(Debug)]
enum CliError {
    Args(String),
    Content(String),
    Validation(Vec<(String, String)>),
    Export(String),
    Io(String),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Args(msg) => write!(f, "参数错误: {msg}"),
            CliError::Content(msg) => write!(f, "内容加载失败: {msg}"),
            CliError::Validation(fields) => {
                write!(f, "输入校验失败:")?;
                for (field, message) in fields {
                    write!(f, "\n  {field}: {message}")?;
                }
                Ok(())
            }
            CliError::Export(msg) => write!(f, "导出失败: {msg}"),
            CliError::Io(msg) => write!(f, "写出失败: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args = match Args::parse(env::args().skip(1).collect()) {
        Ok(a) => a,
        Err(err) => {
            eprintln!("{err}");
            print_help();
            std::process::exit(2);
        }
    };
    if args.help {
        print_help();
        return;
    }

    if let Err(err) = run(args).await {
        eprintln!("{err}");
        let code = match err {
            CliError::Args(_) | CliError::Validation(_) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path.clone())
            .map_err(|e| CliError::Args(format!("配置文件 {path:?} 无效: {e}")))?,
        None => AppConfig::default(),
    };
    let content_dir = args.content_dir.clone().unwrap_or_else(|| config.content_path());
    let public_dir = args.public_dir.clone().unwrap_or_else(|| config.public_path());

    let library = load_content_library(&content_dir, &config.content)
        .map_err(|e| CliError::Content(e.to_string()))?;
    let blocklist = load_blocklist(&content_dir.join(&config.content.blocklist_file))
        .map_err(|e| CliError::Content(e.to_string()))?;

    // 名字与消息按服务端同样的规则校验
    let validation = validate_form_data_with(
        &blocklist,
        &FormData {
            to_name: args.to.clone(),
            from_name: args.from.clone(),
            keywords: args.keywords.clone(),
        },
    );
    let mut field_errors: Vec<(String, String)> = validation.errors.into_iter().collect();
    if let Some(message) = args.message.as_deref()
        && let Some(err) = sanitize_input_with(&blocklist, message, MAX_LENGTHS.message).error
    {
        field_errors.push(("message".to_string(), err));
    }
    if !field_errors.is_empty() {
        return Err(CliError::Validation(field_errors));
    }

    let template = match args.template.as_deref() {
        Some(id) => library
            .template_by_id(id)
            .ok_or_else(|| CliError::Args(format!("未知模板: {id}")))?,
        None => library
            .default_template()
            .ok_or_else(|| CliError::Content("模板列表为空".into()))?,
    };

    let selected_text = match (&args.text_id, &args.message, args.tone) {
        (Some(id), _, _) => Some(Arc::clone(
            library
                .text_by_id(id)
                .ok_or_else(|| CliError::Args(format!("未知文案: {id}")))?,
        )),
        // 自定义消息优先，不需要挑选
        (None, Some(_), _) => None,
        (None, None, Some(tone)) => {
            let mut query = SelectionQuery::new(tone);
            if let Some(k) = &args.keywords {
                query = query.with_keywords(k.clone());
            }
            let picked = select_text(&library, &query);
            match &picked {
                Some(entry) => tracing::info!("已挑选文案: {}", entry.id),
                None => tracing::warn!("语气 {} 下没有可用文案，使用占位文案", tone),
            }
            picked
        }
        (None, None, None) => None,
    };

    let input = CardInput {
        template: Arc::clone(template),
        to_name: args.to,
        from_name: args.from,
        custom_message: args.message,
        selected_text,
        selected_image: args.image,
    };
    let card = render_card(&input.resolve(), args.size);

    let client = build_image_client(config.export.fetch_timeout())
        .map_err(|e| CliError::Export(format!("HTTP client 初始化失败: {e}")))?;
    let fetcher = AssetFetcher::new(
        public_dir.clone(),
        client,
        config.export.inline_cache_max_bytes,
    );
    let options = ExportOptions {
        resources_dir: Some(public_dir),
        ..ExportOptions::from_config(&config.export)
    }
    .with_device_scale(args.scale);
    let exporter = CardExporter::new(fetcher, options, config.export.parallelism());

    let bytes = match args.format {
        OutputFormat::Png => {
            let image = exporter
                .export_to_raster(&card)
                .await
                .map_err(|e| CliError::Export(e.to_string()))?;
            tracing::info!("PNG {}x{} sha256={}", image.width, image.height, image.digest);
            image.bytes
        }
        OutputFormat::Svg => exporter
            .export_to_svg(&card)
            .await
            .map_err(|e| CliError::Export(e.to_string()))?
            .into_bytes(),
        OutputFormat::DataUrl => exporter
            .export_to_data_url(&card)
            .await
            .map_err(|e| CliError::Export(e.to_string()))?
            .into_bytes(),
    };

    match &args.out {
        Some(path) => {
            std::fs::write(path, &bytes).map_err(|e| CliError::Io(format!("{path:?}: {e}")))?;
            eprintln!("已写出 {} 字节到 {:?}", bytes.len(), path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|_| stdout.flush())
                .map_err(|e| CliError::Io(e.to_string()))?;
        }
    }
    Ok(())
}

fn take_value<'a>(argv: &'a [String], idx: usize, flag: &str) -> Result<&'a str, CliError> {
    argv.get(idx)
        .map(String::as_str)
        .ok_or_else(|| CliError::Args(format!("缺少 {flag} 的值")))
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, CliError> {
        let mut args = Args {
            help: false,
            config: None,
            content_dir: None,
            public_dir: None,
            template: None,
            to: None,
            from: None,
            message: None,
            text_id: None,
            tone: None,
            keywords: None,
            image: None,
            size: CardSize::Default,
            scale: 1.0,
            format: OutputFormat::Png,
            out: None,
        };

        let mut idx = 0usize;
        while idx < argv.len() {
            let flag = argv[idx].as_str();
            if matches!(flag, "-h" | "--help") {
                args.help = true;
                idx += 1;
                continue;
            }
            let value = take_value(&argv, idx + 1, flag)?;
            match flag {
                "--config" => args.config = Some(PathBuf::from(value)),
                "--content-dir" => args.content_dir = Some(PathBuf::from(value)),
                "--public-dir" => args.public_dir = Some(PathBuf::from(value)),
                "--template" => args.template = Some(value.to_string()),
                "--to" => args.to = Some(value.to_string()),
                "--from" => args.from = Some(value.to_string()),
                "--message" => args.message = Some(value.to_string()),
                "--text-id" => args.text_id = Some(value.to_string()),
                "--tone" => args.tone = Some(value.parse().map_err(CliError::Args)?),
                "--keywords" => args.keywords = Some(value.to_string()),
                "--image" => args.image = Some(value.to_string()),
                "--size" => args.size = value.parse().map_err(CliError::Args)?,
                "--scale" => {
                    args.scale = value
                        .parse::<f32>()
                        .ok()
                        .filter(|s| s.is_finite() && *s > 0.0)
                        .ok_or_else(|| CliError::Args(format!("--scale 需要正数，收到 {value}")))?;
                }
                "--format" => {
                    args.format = match value {
                        "png" => OutputFormat::Png,
                        "svg" => OutputFormat::Svg,
                        "data-url" | "dataurl" => OutputFormat::DataUrl,
                        other => return Err(CliError::Args(format!("未知输出格式: {other}"))),
                    }
                }
                "--out" => args.out = Some(PathBuf::from(value)),
                other => return Err(CliError::Args(format!("未知参数: {other}"))),
            }
            idx += 2;
        }
        Ok(args)
    }
}

fn print_help() {
    println!(
        r#"card_export（本地卡片导出工具）

参数：
  --config PATH             配置文件（可选，默认使用内置默认值）
  --content-dir DIR         内容目录（默认 ./content）
  --public-dir DIR          公开静态目录，/ 开头的图片路径据此解析（默认 ./public）
  --template ID             模板 id（默认第一个模板）
  --to NAME                 收件人
  --from NAME               署名
  --message TEXT            自定义消息（优先于库内文案）
  --text-id ID              指定库内文案
  --tone TONE               cute|funny|spicy|office|taylor，按语气挑选文案
  --keywords TEXT           挑选关键词（空白或逗号分隔）
  --image PATH              插画路径或 http(s) URL
  --size SIZE               default|large
  --scale F                 设备像素比（上限 2，默认 1）
  --format FMT              png|svg|data-url（默认 png）
  --out PATH                输出文件（默认写到标准输出）
  -h, --help                显示帮助
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_selection_flags() {
        let args = Args::parse(argv(&[
            "--tone", "funny", "--keywords", "pizza", "--size", "large", "--scale", "3",
            "--format", "data-url",
        ]))
        .unwrap();
        assert_eq!(args.tone, Some(Tone::Funny));
        assert_eq!(args.keywords.as_deref(), Some("pizza"));
        assert_eq!(args.size, CardSize::Large);
        assert_eq!(args.scale, 3.0);
        assert_eq!(args.format, OutputFormat::DataUrl);
    }

    #[test]
    fn rejects_unknown_flag_and_missing_value() {
        assert!(matches!(
            Args::parse(argv(&["--bogus", "x"])),
            Err(CliError::Args(_))
        ));
        assert!(matches!(
            Args::parse(argv(&["--to"])),
            Err(CliError::Args(_))
        ));
        assert!(matches!(
            Args::parse(argv(&["--scale", "-1"])),
            Err(CliError::Args(_))
        ));
    }

    #[test]
    fn help_flag_short_circuits_values() {
        let args = Args::parse(argv(&["-h"])).unwrap();
        assert!(args.help);
    }
}
