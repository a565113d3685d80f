mod config;
mod render;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    screens, HttpTransport, Lifecycle, ListViewController, ViewBinding, ViewEvent,
};
use serde_json::json;
use shared::domain::{parse_filter_expression, QueryParams, RowKey, SortDirection, TriState};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Trust and fraud review console")]
struct Args {
    /// Settings file; defaults to ./console.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the known screens with their actions and batch jobs.
    Screens,
    /// Load a screen and print the rows that match the query.
    List {
        screen: String,
        #[arg(long)]
        search: Option<String>,
        /// `name=all|true|false`, repeatable.
        #[arg(long = "filter", value_parser = parse_filter_expression)]
        filters: Vec<(String, TriState)>,
        #[arg(long)]
        sort: Option<SortDirection>,
    },
    /// Mark an IP log entry as safe.
    MarkSafe { id: i64 },
    /// Verify a user profile.
    Verify { user_id: i64 },
    /// Run a screen's batch job, then print the refreshed list.
    Batch { screen: String, job: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let session = match args.command {
        Command::Screens => {
            print_screens();
            return Ok(());
        }
        Command::List {
            screen,
            search,
            filters,
            sort,
        } => {
            let binding = screens::by_name(&screen)?;
            let mut params = binding.default_params.clone();
            if let Some(search) = search {
                params = params.with_search(search);
            }
            for (selector, value) in filters {
                if !binding
                    .filter_selectors()
                    .iter()
                    .any(|(name, _)| *name == selector)
                {
                    bail!("screen '{screen}' has no filter '{selector}'");
                }
                params = params.with_filter(selector, value);
            }
            if let Some(sort) = sort {
                params = params.with_sort(sort);
            }
            let transport = connect(args.config, args.api_base)?;
            let session = Session::open(binding, transport, params).await?;
            render_list(&session.controller);
            session
        }
        Command::MarkSafe { id } => {
            let transport = connect(args.config, args.api_base)?;
            let mut session =
                Session::open(screens::ip_logs(), transport, QueryParams::default()).await?;
            session.run_action(RowKey::from(id), screens::MARK_SAFE).await?;
            session
        }
        Command::Verify { user_id } => {
            let transport = connect(args.config, args.api_base)?;
            let mut session =
                Session::open(screens::user_profiles(), transport, QueryParams::default()).await?;
            session.run_action(RowKey::from(user_id), screens::VERIFY).await?;
            session
        }
        Command::Batch { screen, job } => {
            let binding = screens::by_name(&screen)?;
            let transport = connect(args.config, args.api_base)?;
            let mut session = Session::open(binding, transport, QueryParams::default()).await?;
            session.run_batch(&job).await?;
            render_list(&session.controller);
            session
        }
    };

    let failed = session.controller.snapshot().error.is_some();
    session.controller.shutdown();
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn connect(config_path: Option<PathBuf>, api_base: Option<String>) -> Result<Arc<HttpTransport>> {
    let mut settings = config::load_settings(config_path.as_deref())?;
    if let Some(api_base) = api_base {
        settings.api_base = api_base;
    }
    let base_url = settings.api_base_url()?;
    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .context("failed to build http client")?;
    info!(api_base = %base_url, "console: using api");
    Ok(Arc::new(HttpTransport::with_client(base_url, http)))
}

struct Session {
    controller: Arc<ListViewController>,
    events: broadcast::Receiver<ViewEvent>,
}

impl Session {
    async fn open(
        binding: ViewBinding,
        transport: Arc<HttpTransport>,
        params: QueryParams,
    ) -> Result<Self> {
        let controller = ListViewController::new(binding, transport);
        let events = controller.subscribe();
        let mut session = Self { controller, events };
        session.controller.load(params)?;
        session.wait_for_load().await?;
        Ok(session)
    }

    async fn wait_for_load(&mut self) -> Result<()> {
        self.wait_for(|event| {
            matches!(
                event,
                ViewEvent::LifecycleChanged(Lifecycle::Succeeded | Lifecycle::Failed)
            )
        })
        .await?;
        Ok(())
    }

    async fn wait_for(&mut self, wanted: impl Fn(&ViewEvent) -> bool) -> Result<ViewEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if wanted(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("view closed"),
            }
        }
    }

    async fn run_action(&mut self, row_key: RowKey, action: &str) -> Result<()> {
        self.controller.perform_action(row_key.clone(), action, json!({}))?;
        self.wait_for(|event| matches!(event, ViewEvent::ActionFinished { .. }))
            .await?;
        render::print_banners(&self.controller.snapshot());
        if let Some(row) = self.controller.row(&row_key) {
            print!("{}", render::format_table(&[row]));
        }
        Ok(())
    }

    async fn run_batch(&mut self, job: &str) -> Result<()> {
        self.controller.run_batch(job)?;
        let finished = self
            .wait_for(|event| matches!(event, ViewEvent::BatchFinished { .. }))
            .await?;
        if let ViewEvent::BatchFinished {
            succeeded: true, ..
        } = finished
        {
            self.wait_for_load().await?;
        }
        Ok(())
    }
}

fn render_list(controller: &ListViewController) {
    let snapshot = controller.snapshot();
    render::print_banners(&snapshot);
    if snapshot.lifecycle == Lifecycle::Succeeded {
        let rows = controller.visible_rows();
        print!("{}", render::format_table(&rows));
        println!("{} of {} rows", rows.len(), snapshot.row_count);
    }
}

fn print_screens() {
    for binding in screens::all() {
        let actions: Vec<&str> = binding.actions.iter().map(|a| a.name.as_str()).collect();
        let batches: Vec<&str> = binding.batches.iter().map(|b| b.name.as_str()).collect();
        let filters: Vec<&str> = binding
            .filter_selectors()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        println!(
            "{:<22} {:<36} filters=[{}] actions=[{}] batches=[{}]",
            binding.name,
            binding.endpoint,
            filters.join(","),
            actions.join(","),
            batches.join(",")
        );
    }
}
