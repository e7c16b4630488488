mod ai;
mod auth;
mod config;
mod models;
mod storage;
mod store;
mod tui;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ai::{analyze_job, create_provider, AnalysisRequest};
use auth::{AuthProvider, IdTokenAuth};
use config::Config;
use models::{CategoryFilter, InterviewPatch, JobApplication, Lang, NewApplication, Provider};
use storage::{KeyValueStore, SqliteStore};
use store::ApplicationStore;

#[derive(Parser)]
#[command(name = "offerflow")]
#[command(about = "Job application tracker - log applications, move them through interviews, watch the funnel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a new position (AI fills in the details from a link or text)
    Add {
        /// Company name
        #[arg(long)]
        company: Option<String>,

        /// Position title
        #[arg(long)]
        position: Option<String>,

        /// Category (tech, product, design, ops, data, other)
        #[arg(short, long, default_value = "tech")]
        category: String,

        /// Job posting link
        #[arg(short, long)]
        link: Option<String>,

        /// Raw job description text
        #[arg(short, long)]
        text: Option<String>,

        /// Work location
        #[arg(long)]
        location: Option<String>,

        /// Where you found the job (linkedin, referral, ...)
        #[arg(long)]
        channel: Option<String>,

        /// Skip AI analysis and use the values given
        #[arg(long)]
        manual: bool,
    },

    /// List applications
    List {
        /// Search company or position
        #[arg(default_value = "")]
        query: String,

        /// Filter by category (all, tech, product, design, ops, data, other)
        #[arg(short, long, default_value = "all")]
        category: String,
    },

    /// Show application details
    Show {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Move an application to a milestone (0=applied .. 5=offer)
    Stage {
        /// Application ID (or unique prefix)
        id: String,

        /// Milestone index
        #[arg(value_parser = clap::value_parser!(u8).range(0..=5))]
        index: u8,
    },

    /// Mark or unmark an application as rejected
    Reject {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Replace your personal reflections on an application
    Reflect {
        /// Application ID (or unique prefix)
        id: String,

        /// Reflection text
        text: String,
    },

    /// Manage interview rounds
    Interview {
        #[command(subcommand)]
        command: InterviewCommands,
    },

    /// Show funnel statistics
    Stats,

    /// Browse applications interactively
    Browse {
        /// Search company or position
        #[arg(default_value = "")]
        query: String,

        /// Filter by category
        #[arg(short, long, default_value = "all")]
        category: String,
    },

    /// Sign in with an identity token from Google or Apple
    Login {
        /// Provider (google, apple)
        provider: String,

        /// Identity token
        #[arg(long, conflicts_with = "token_file")]
        token: Option<String>,

        /// File containing the identity token
        #[arg(long)]
        token_file: Option<PathBuf>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Show or set the display language (zh, en)
    Lang {
        lang: Option<String>,
    },
}

#[derive(Subcommand)]
enum InterviewCommands {
    /// Add an interview round at the current milestone
    Add {
        /// Application ID (or unique prefix)
        id: String,
    },

    /// Update fields of an interview round
    Update {
        /// Application ID (or unique prefix)
        id: String,

        /// Interview ID (or unique prefix)
        interview: String,

        #[arg(long)]
        round: Option<String>,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Time (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// Interviewer name or notes about them
        #[arg(long)]
        interviewer: Option<String>,

        /// Meeting link (empty string clears it)
        #[arg(long)]
        link: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        reflections: Option<String>,

        /// How it went, 0-5
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: Option<u8>,

        /// Mark completed (true/false)
        #[arg(long)]
        completed: Option<bool>,
    },

    /// Delete an interview round
    Delete {
        /// Application ID (or unique prefix)
        id: String,

        /// Interview ID (or unique prefix)
        interview: String,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load()?;
    let storage = SqliteStore::open(&config.data_dir())?;
    tracing::debug!(path = ?storage.path(), "opened store");
    let mut store = ApplicationStore::load(storage, config.unreject_policy())?;

    match cli.command {
        Commands::Add {
            company,
            position,
            category,
            link,
            text,
            location,
            channel,
            manual,
        } => {
            let form = NewApplication {
                company_name: company.unwrap_or_default(),
                position_title: position.unwrap_or_default(),
                category: category.parse()?,
                location,
                channel,
                jd_link: link,
                jd_text: text,
            };

            let enrichment = if manual {
                None
            } else {
                let request = AnalysisRequest::from(&form);
                if request.is_empty() {
                    bail!("Nothing to analyze. Pass --link, --text, --company or --position, or use --manual.");
                }
                println!("Analyzing job with AI...");
                let analysis = create_provider(&config.ai)
                    .and_then(|provider| analyze_job(provider.as_ref(), &request));
                match analysis {
                    Ok(analysis) => Some(analysis),
                    Err(e) => {
                        tracing::warn!(error = %e, "AI analysis failed");
                        return Err(anyhow!(
                            "AI analysis failed, please fill manually (--manual): {:#}",
                            e
                        ));
                    }
                }
            };

            let id = store.add_application(form, enrichment)?;
            if let Some(app) = store.get(&id) {
                println!(
                    "Tracking {} - {} [{}]",
                    app.company_name,
                    app.position_title,
                    short_id(&app.id)
                );
            }
        }

        Commands::List { query, category } => {
            let category: CategoryFilter = category.parse()?;
            let apps = store.filter(&query, category);
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                let lang = store.lang();
                println!(
                    "{:<9} {:<13} {:<10} {:<22} {:<24} {:<10}",
                    "ID", "STATUS", "STAGE", "COMPANY", "POSITION", "APPLIED"
                );
                println!("{}", "-".repeat(91));
                for app in apps {
                    println!(
                        "{:<9} {:<13} {:<10} {:<22} {:<24} {:<10}",
                        short_id(&app.id),
                        app.status.as_str(),
                        truncate(app.stage.label(lang), 10),
                        truncate(&app.company_name, 20),
                        truncate(&app.position_title, 22),
                        app.applied_date
                    );
                }
            }
        }

        Commands::Show { id } => {
            let app = store
                .find(&id)?
                .ok_or_else(|| anyhow!("Application '{}' not found", id))?;
            print_application(app, store.lang());
        }

        Commands::Stage { id, index } => {
            let id = resolve_id(&store, &id)?;
            store.advance_stage(&id, index as usize)?;
            if let Some(app) = store.get(&id) {
                println!(
                    "{}: stage {} ({}), status {}",
                    app.company_name,
                    app.stage.index(),
                    app.stage.label(store.lang()),
                    app.status
                );
            }
        }

        Commands::Reject { id } => {
            let id = resolve_id(&store, &id)?;
            store.toggle_rejected(&id)?;
            if let Some(app) = store.get(&id) {
                println!("{}: status {}", app.company_name, app.status);
            }
        }

        Commands::Reflect { id, text } => {
            let id = resolve_id(&store, &id)?;
            store.set_reflections(&id, &text)?;
            println!("Reflections saved.");
        }

        Commands::Interview { command } => match command {
            InterviewCommands::Add { id } => {
                let id = resolve_id(&store, &id)?;
                if let Some(interview_id) = store.add_interview(&id)? {
                    println!("Added interview [{}]", short_id(&interview_id));
                }
            }

            InterviewCommands::Update {
                id,
                interview,
                round,
                date,
                time,
                interviewer,
                link,
                notes,
                reflections,
                rating,
                completed,
            } => {
                let id = resolve_id(&store, &id)?;
                let interview_id = resolve_interview_id(&store, &id, &interview)?;
                let patch = InterviewPatch {
                    round,
                    date,
                    time,
                    interviewer_info: interviewer,
                    meeting_link: link,
                    notes,
                    reflections,
                    experience_rating: rating,
                    is_completed: completed,
                };
                if patch.is_empty() {
                    println!("Nothing to update.");
                } else if store.update_interview(&id, &interview_id, patch)? {
                    println!("Interview updated.");
                }
            }

            InterviewCommands::Delete { id, interview, yes } => {
                let id = resolve_id(&store, &id)?;
                let interview_id = resolve_interview_id(&store, &id, &interview)?;
                let mut confirm = |question: &str| yes || prompt_yes_no(question);
                if store.delete_interview(&id, &interview_id, &mut confirm)? {
                    println!("Interview deleted.");
                } else {
                    println!("Kept.");
                }
            }
        },

        Commands::Stats => {
            let stats = store.stats();
            println!("Total applied:   {}", stats.total);
            println!("Interviewing:    {}", stats.interviewing);
            println!("Offers:          {}", stats.offers);
            println!("Rejected:        {}", stats.rejected);
            println!("Interview rate:  {}%", stats.interview_rate);
            println!("Offer rate:      {}%", stats.offer_rate);
            if stats.rejected > 0 {
                println!("\nStay positive and keep going!");
            }
        }

        Commands::Browse { query, category } => {
            let category: CategoryFilter = category.parse()?;
            tui::run_browse(&mut store, &query, category)?;
        }

        Commands::Login {
            provider,
            token,
            token_file,
        } => {
            let provider: Provider = provider.parse()?;
            let token = match (token, token_file) {
                (Some(token), _) => token,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))?,
                (None, None) => bail!("Pass --token or --token-file"),
            };

            let auth = IdTokenAuth::new(provider, &token);
            let welcome = match store.lang() {
                Lang::Zh => "欢迎回来，",
                Lang::En => "Welcome back, ",
            };
            match store.sign_in(&auth) {
                Ok(user) => println!("{}{}", welcome, user.name),
                Err(e) => {
                    tracing::warn!(provider = provider.as_str(), error = %e, "sign-in failed");
                    bail!("Login Failed: {:#}", e);
                }
            }
        }

        Commands::Logout => {
            // Identity tokens are not kept, so the adapter only needs the provider
            let auth = store
                .user()
                .and_then(|user| user.provider)
                .map(|provider| IdTokenAuth::new(provider, ""));
            store.sign_out(auth.as_ref().map(|a| a as &dyn AuthProvider))?;
            println!("Logged out.");
        }

        Commands::Whoami => match store.user() {
            Some(user) => {
                println!("{}", user.name);
                if let Some(provider) = user.provider {
                    println!("Provider: {}", provider.as_str());
                }
                if let Some(picture) = &user.picture {
                    println!("Picture: {}", picture);
                }
            }
            None => println!("Not signed in."),
        },

        Commands::Lang { lang } => match lang {
            Some(lang) => {
                let lang: Lang = lang.parse()?;
                store.set_lang(lang)?;
                println!("Language set to {}", lang.as_str());
            }
            None => println!("{}", store.lang().as_str()),
        },
    }

    Ok(())
}

fn resolve_id<S: KeyValueStore>(store: &ApplicationStore<S>, id: &str) -> Result<String> {
    store
        .find(id)?
        .map(|app| app.id.clone())
        .ok_or_else(|| anyhow!("Application '{}' not found", id))
}

fn resolve_interview_id<S: KeyValueStore>(
    store: &ApplicationStore<S>,
    app_id: &str,
    interview: &str,
) -> Result<String> {
    let app = store
        .get(app_id)
        .ok_or_else(|| anyhow!("Application '{}' not found", app_id))?;
    if let Some(exact) = app.interviews.iter().find(|i| i.id == interview) {
        return Ok(exact.id.clone());
    }
    let matches: Vec<&str> = app
        .interviews
        .iter()
        .filter(|i| !interview.is_empty() && i.id.starts_with(interview))
        .map(|i| i.id.as_str())
        .collect();
    match matches.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(anyhow!("Interview '{}' not found", interview)),
        _ => Err(anyhow!("Interview prefix '{}' is ambiguous", interview)),
    }
}

fn prompt_yes_no(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_application(app: &JobApplication, lang: Lang) {
    println!("{} - {}", app.company_name, app.position_title);
    println!("ID: {}", app.id);
    println!("Category: {}", app.category.label(lang));
    println!("Status: {}", app.status);
    println!("Stage: {} ({})", app.stage.index(), app.stage.label(lang));
    println!("Applied: {}", app.applied_date);
    if let Some(location) = &app.location {
        println!("Location: {}", location);
    }
    if let Some(channel) = &app.channel {
        println!("Source: {}", channel);
    }
    if let Some(link) = &app.jd_link {
        println!("Link: {}", link);
    }

    if let Some(report) = &app.ai_suggestions {
        println!("\n--- AI Analysis ---");
        println!("{}", textwrap::fill(&report.summary, 80));
        if !report.suitability_assessment.is_empty() {
            println!("\nSuitability:\n{}", textwrap::fill(&report.suitability_assessment, 80));
        }
        print_list("Key Responsibilities", &report.responsibilities);
        print_list("Requirements", &report.requirements);
        print_list("Common Interview Questions", &report.potential_questions);
        print_list("Interview Strategy", &report.interview_tips);
    }

    if !app.interviews.is_empty() {
        println!("\n--- Interviews ---");
        for interview in &app.interviews {
            println!(
                "[{}] {} {} {} {}",
                short_id(&interview.id),
                if interview.is_completed { "done" } else { "pending" },
                interview.round,
                interview.date,
                interview.time.as_deref().unwrap_or("")
            );
            if !interview.interviewer_info.is_empty() {
                println!("    Interviewer: {}", interview.interviewer_info);
            }
            if let Some(link) = &interview.meeting_link {
                println!("    Meeting: {}", link);
            }
            if interview.experience_rating > 0 {
                println!("    Rating: {}/5", interview.experience_rating);
            }
            if !interview.notes.is_empty() {
                println!("    Notes: {}", interview.notes);
            }
            if !interview.reflections.is_empty() {
                println!("    Reflection: {}", interview.reflections);
            }
        }
    }

    if !app.my_reflections.is_empty() {
        println!("\n--- Reflections ---\n{}", app.my_reflections);
    }

    if let Some(text) = &app.jd_text {
        println!("\n--- Job Description ---\n{}", text);
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
