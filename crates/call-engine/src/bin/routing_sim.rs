//! Routing simulator
//!
//! Runs a burst of inbound calls against the in-process router:
//! 1. Connects a pool of agents, some with the `billing` skill
//! 2. Routes calls, answering or missing each offer at random
//! 3. Completes connected calls as it goes and drains the hold queue
//! 4. Prints router and presence statistics as JSON

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};

use callcenter_call_engine::prelude::*;
use callcenter_infra_common::logging::log_welcome;
use callcenter_infra_common::{setup_logging, ErrorExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulate call routing against in-memory agents", long_about = None)]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of agents to connect
    #[arg(short, long, default_value = "5")]
    agents: usize,

    /// Number of inbound calls to route
    #[arg(short = 'n', long, default_value = "20")]
    calls: usize,

    /// Probability that an offered agent does not answer
    #[arg(long, default_value = "0.2")]
    no_answer_rate: f64,

    /// Calls kept connected before the oldest one is completed
    #[arg(long, default_value = "3")]
    concurrent: usize,

    /// Log level override
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CallCenterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CallCenterConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= args.json;
    config.logging.app_name = "routing-sim".to_string();
    setup_logging(&config.logging).map_err(|e| e.with_context("routing_sim", "setup_logging"))?;
    log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));

    if !(0.0..=1.0).contains(&args.no_answer_rate) {
        anyhow::bail!("--no-answer-rate must be within 0.0-1.0");
    }

    let router = CallRouter::builder(config).build()?;

    for i in 0..args.agents {
        let mut profile = AgentProfile::default().with_satisfaction((i % 5) as f64);
        if i % 2 == 0 {
            profile = profile.with_skill("billing", 4);
        }
        let meta = SessionMeta::new(format!("sim-{}", i)).with_profile(profile);
        router.agent_connected(&AgentId::from(format!("agent-{:02}", i)), meta).await?;
    }
    info!("👥 {} agents connected", args.agents);

    let mut connected: VecDeque<String> = VecDeque::new();
    let mut held: Vec<String> = Vec::new();

    for i in 0..args.calls {
        let call_id = format!("sim-call-{:04}", i);
        let mut request = RoutingRequest::inbound(&call_id, format!("+1555{:07}", i));
        if i % 3 == 0 {
            request = request.with_skill("billing").with_priority(6);
        }

        let outcome = router.route_inbound(request).await?;
        match play_out(&router, &call_id, outcome, args.no_answer_rate).await? {
            RouteOutcome::Connected { .. } => connected.push_back(call_id),
            RouteOutcome::OnHold { .. } => held.push(call_id),
            other => warn!("Call {} finished early: {:?}", call_id, other),
        }

        if connected.len() > args.concurrent {
            if let Some(done) = connected.pop_front() {
                router.on_dial_outcome(&done, DialOutcome::Completed).await?;
                drain_hold(&router, &mut held, &mut connected, args.no_answer_rate).await?;
            }
        }
    }

    while let Some(done) = connected.pop_front() {
        router.on_dial_outcome(&done, DialOutcome::Completed).await?;
        drain_hold(&router, &mut held, &mut connected, args.no_answer_rate).await?;
    }

    for call_id in held.drain(..) {
        router.on_queue_abandoned(&call_id).await?;
    }

    let report = serde_json::json!({
        "routing": router.stats(),
        "presence": router.presence_statistics().await?,
        "events": router.events().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Answer or miss offers until the call connects or lands on hold
async fn play_out(
    router: &Arc<CallRouter>,
    call_id: &str,
    mut outcome: RouteOutcome,
    no_answer_rate: f64,
) -> anyhow::Result<RouteOutcome> {
    while let RouteOutcome::Ringing { .. } = outcome {
        let dial = if rand::thread_rng().gen_bool(no_answer_rate) {
            DialOutcome::NoAnswer
        } else {
            DialOutcome::Answered
        };
        outcome = router.on_dial_outcome(call_id, dial).await?;
    }
    Ok(outcome)
}

/// Re-offer held calls, oldest first, until one stays on hold
async fn drain_hold(
    router: &Arc<CallRouter>,
    held: &mut Vec<String>,
    connected: &mut VecDeque<String>,
    no_answer_rate: f64,
) -> anyhow::Result<()> {
    while !held.is_empty() {
        let call_id = held.remove(0);
        let outcome = router.on_hold_tick(&call_id).await?;
        match play_out(router, &call_id, outcome, no_answer_rate).await? {
            RouteOutcome::Connected { .. } => connected.push_back(call_id),
            RouteOutcome::OnHold { .. } => {
                held.insert(0, call_id);
                break;
            }
            other => warn!("Held call {} finished early: {:?}", call_id, other),
        }
    }
    Ok(())
}
