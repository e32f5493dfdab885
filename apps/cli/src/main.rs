use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use auditscribe_core_sdk::config_store::DEFAULT_PROVIDER;
use auditscribe_core_sdk::models::{
    ChatRequest, ConfigDraft, ContextFields, GeneratedContent, GenerationRequest,
    GenerationResult, Message, Role, TemplateCriteria, TemplateDraft,
};
use auditscribe_core_sdk::prelude::*;

/**
 * \brief CLI 程序入口：配置后端、生成内容、对话、查看统计。
 */
#[derive(Parser, Debug)]
#[command(name = "auditscribe", version, about = "AuditScribe GRC content generation")]
struct Cli {
    /** \brief 配置与日志的归属用户。 */
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 保存某个后端的生成配置。
     */
    Init {
        #[arg(long, default_value = DEFAULT_PROVIDER)]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long, default_value_t = false)]
        enable_telemetry: bool,
    },

    /**
     * \brief 列出后端；`--live` 时探活并列出本地已安装模型。
     */
    Providers {
        #[arg(long, default_value_t = false)]
        live: bool,
    },

    /**
     * \brief 生成一段内容，如 `generate objectives --title "Q3 Data Privacy Review"`。
     */
    Generate {
        content_type: String,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        context: Option<String>,
        /** \brief 结构化字段，JSON 对象，如 `{"vendor":{"name":"Acme"}}`。 */
        #[arg(long)]
        fields: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        framework: Option<String>,
        #[arg(long)]
        template_id: Option<i64>,
    },

    /**
     * \brief 单轮提问。
     */
    Chat {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        prompt: String,
    },

    /**
     * \brief 当前用户的生成统计与最近记录。
     */
    Stats {
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },

    #[command(subcommand)]
    Templates(TemplateCommand),

    /**
     * \brief 启动本地 HTTP 服务。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },

    /**
     * \brief 查看或切换运行日志：on / off / status。
     */
    Telemetry {
        #[arg(value_parser = ["on", "off", "status"], default_value = "status")]
        state: String,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    List {
        #[arg(long)]
        content_type: Option<String>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        content_type: String,
        /** \brief 模板正文文件。 */
        #[arg(long)]
        body: PathBuf,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        framework: Option<String>,
        #[arg(long, default_value_t = false)]
        default: bool,
    },
    Remove {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().context("load settings failed")?;
    let store = Arc::new(
        SqliteStore::open(&settings.database_path)
            .with_context(|| format!("open database {} failed", settings.database_path.display()))?,
    );
    telemetry::configure(&settings);
    if store.telemetry_enabled().unwrap_or(false) {
        telemetry::set_enabled(true);
    }
    let service = GenerationService::with_sqlite(settings, store.clone())
        .context("build generation service failed")?;
    let user = Some(cli.user.as_str());

    match cli.command {
        Commands::Init {
            provider,
            model,
            api_key,
            endpoint,
            temperature,
            max_tokens,
            enable_telemetry,
        } => {
            let draft = ConfigDraft {
                model,
                api_key,
                endpoint,
                temperature,
                max_tokens,
                ..ConfigDraft::new(&provider)
            };
            let saved = service
                .configs()
                .save(user, &draft)
                .context("save configuration failed")?;
            if enable_telemetry {
                store
                    .set_telemetry_enabled(true)
                    .context("save telemetry failed")?;
                telemetry::set_enabled(true);
            }
            println!(
                "Saved {} configuration for {} (model={} temperature={} max_tokens={})",
                saved.provider, saved.user_id, saved.model, saved.temperature, saved.max_tokens
            );
        }
        Commands::Providers { live } => {
            for provider in service.catalog().list_providers() {
                let descriptor = if live {
                    service
                        .provider_models(&provider.id, None)
                        .await
                        .unwrap_or_else(|| provider.clone())
                } else {
                    provider.clone()
                };
                println!(
                    "{:<10} {:<18} default={} models={}",
                    descriptor.id,
                    descriptor.display_name,
                    descriptor.default_model,
                    descriptor.models.join(", ")
                );
                if live {
                    match service.check_availability(&provider.id, None).await {
                        Ok(a) if a.running => println!("           running"),
                        Ok(a) => println!(
                            "           not running: {}",
                            a.error.unwrap_or_default()
                        ),
                        Err(e) => println!("           {}", e),
                    }
                }
            }
        }
        Commands::Generate {
            content_type,
            provider,
            model,
            title,
            context,
            fields,
            industry,
            framework,
            template_id,
        } => {
            let content_type = ContentType::from_str(&content_type)?;
            let (provider, model) = pick_backend(&service, user, provider, model);
            let mut request = GenerationRequest::new(&provider, &model, content_type);
            if let Some(raw) = fields {
                request.fields = serde_json::from_str::<ContextFields>(&raw)
                    .context("--fields must be a JSON object")?;
            }
            if title.is_some() {
                request.fields.title = title;
            }
            request.context = context.unwrap_or_default();
            request.industry = industry;
            request.framework = framework;
            request.template_id = template_id;

            telemetry::log_event(
                "cli.generate",
                &format!("provider={} model={} type={}", provider, model, content_type),
            );
            print_result(service.generate(user, request).await)?;
        }
        Commands::Chat {
            provider,
            model,
            system,
            prompt,
        } => {
            let (provider, model) = pick_backend(&service, user, provider, model);
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::new(Role::System, system));
            }
            messages.push(Message::new(Role::User, prompt));
            let request = ChatRequest {
                provider,
                model,
                messages,
                api_key: None,
                endpoint: None,
                temperature: None,
                max_tokens: None,
            };
            telemetry::log_event(
                "cli.chat",
                &format!("provider={} model={}", request.provider, request.model),
            );
            print_result(service.generate_chat(user, request).await)?;
        }
        Commands::Stats { recent } => {
            let stats = service.stats(user).context("load stats failed")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            for entry in service
                .recent_logs(user, recent)
                .context("load logs failed")?
            {
                println!(
                    "{} {:<8} {:<10} {:<24} {}",
                    entry.created_at,
                    if entry.success { "ok" } else { "failed" },
                    entry.provider,
                    entry.content_type,
                    entry.error.unwrap_or_default()
                );
            }
        }
        Commands::Templates(command) => match command {
            TemplateCommand::List { content_type } => {
                let criteria = TemplateCriteria {
                    content_type,
                    ..TemplateCriteria::default()
                };
                for t in service.templates().list_templates(&criteria)? {
                    println!(
                        "{:>4} {:<24} {:<20} v{} industry={} framework={}{}{}",
                        t.id,
                        t.name,
                        t.content_type,
                        t.version,
                        t.industry.unwrap_or_default(),
                        t.framework.unwrap_or_default(),
                        if t.is_default { " default" } else { "" },
                        if t.is_active { "" } else { " inactive" }
                    );
                }
            }
            TemplateCommand::Add {
                name,
                content_type,
                body,
                industry,
                framework,
                default,
            } => {
                let body = std::fs::read_to_string(&body)
                    .with_context(|| format!("read template body {}", body.display()))?;
                let created = service.templates().create(&TemplateDraft {
                    name,
                    content_type,
                    body,
                    industry,
                    framework,
                    is_active: true,
                    is_default: default,
                    version: 1,
                })?;
                println!("Created template id={} ({})", created.id, created.name);
            }
            TemplateCommand::Remove { id } => {
                service.templates().delete(id)?;
                println!("Removed template id={}", id);
            }
        },
        Commands::Serve { addr } => {
            server::run(&addr, Arc::new(service)).await?;
        }
        Commands::Telemetry { state } => {
            match state.as_str() {
                "on" => store.set_telemetry_enabled(true)?,
                "off" => store.set_telemetry_enabled(false)?,
                _ => {}
            }
            println!(
                "telemetry: {}",
                if store.telemetry_enabled()? { "on" } else { "off" }
            );
        }
    }

    Ok(())
}

/**
 * \brief 未指定后端/模型时取用户保存的配置。
 */
fn pick_backend(
    service: &GenerationService,
    user: Option<&str>,
    provider: Option<String>,
    model: Option<String>,
) -> (String, String) {
    let provider = provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let model = model.unwrap_or_else(|| service.configs().resolve(user, Some(&provider)).model);
    (provider, model)
}

fn print_result(result: GenerationResult) -> Result<()> {
    if !result.success {
        bail!(
            "{} / {} failed: {}",
            result.provider,
            result.model,
            result.error.unwrap_or_default()
        );
    }
    match &result.content {
        Some(GeneratedContent::Text(text)) => println!("{}", text),
        Some(structured) => println!("{}", serde_json::to_string_pretty(structured)?),
        None => {}
    }
    if let Some(tokens) = result.tokens_used {
        eprintln!("tokens: {}", tokens);
    }
    Ok(())
}
