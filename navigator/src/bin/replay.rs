use std::{fs::File, io::BufReader, path::PathBuf, sync::Arc};

use chrono::{TimeDelta, Utc};
use clap::Parser;
use navigator::{
    config::NavigationConfig,
    gpx_trace::{read_fixes, write_trace},
    models::{NavigationState, Route},
    provider::{DirectRouteProvider, HttpRoutingProvider, RoutingProvider},
    session::NavigationSession,
    snapper::RouteSnapper,
    voice::TracingVoice,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replay a recorded GPX track against a route and print the guidance"
)]
struct Args {
    /// Route JSON (points, steps, totals)
    #[arg(long)]
    route: PathBuf,

    /// GPX track whose points are fed as fixes
    #[arg(long)]
    track: PathBuf,

    #[arg(long, default_value = "destination")]
    destination: String,

    /// Time between two consecutive track points, 1 ms to 1 h
    #[arg(
        long,
        default_value_t = 1000,
        value_parser = clap::value_parser!(u32).range(1..=3_600_000)
    )]
    interval_ms: u32,

    /// Navigation config JSON; defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Routing service used for recalculation; straight lines when omitted
    #[arg(long)]
    routing_url: Option<String>,

    /// Write the snapped positions to this GPX file
    #[arg(long)]
    snapped_out: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct ReplaySummary {
    fixes: usize,
    announcements: usize,
    off_route_fixes: usize,
    reroutes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let route: Route = serde_json::from_reader(BufReader::new(File::open(&args.route)?))?;
    let config = match &args.config {
        Some(path) => NavigationConfig::from_file(path)?,
        None => NavigationConfig::default(),
    };
    let provider: Arc<dyn RoutingProvider> = match &args.routing_url {
        Some(url) => Arc::new(HttpRoutingProvider::new(url)),
        None => Arc::new(DirectRouteProvider::default()),
    };
    let snapper = RouteSnapper::new(config.snap_search_radius);

    let fixes = read_fixes(
        BufReader::new(File::open(&args.track)?),
        Utc::now(),
        TimeDelta::milliseconds(i64::from(args.interval_ms)),
    )?;
    tracing::info!(
        "replaying {} fixes from {:?} on {:?}",
        fixes.len(),
        args.track,
        args.route
    );

    let mut session = NavigationSession::new(config, provider, Arc::new(TracingVoice));
    session.start(route, args.destination.as_str())?;

    let mut summary = ReplaySummary::default();
    let mut snapped = Vec::with_capacity(fixes.len());
    let mut current_route = session.state().as_active().map(|a| a.route.clone());

    for fix in fixes {
        summary.fixes += 1;
        let response = session.handle_fix(fix);
        if response.announcement.is_some() {
            summary.announcements += 1;
        }

        let NavigationState::Active(active) = &response.state else {
            snapped.push(fix.position());
            if response.state.is_arrived() {
                break;
            }
            continue;
        };
        if active.is_off_route {
            summary.off_route_fixes += 1;
        }
        if current_route
            .as_ref()
            .is_some_and(|route| !Arc::ptr_eq(route, &active.route))
        {
            summary.reroutes += 1;
            current_route = Some(active.route.clone());
        }
        let snap = snapper.snap(
            fix.position(),
            &active.route.points,
            Some(active.closest_point_index),
        );
        snapped.push(snap.closest_point);

        // let a pending recalculation make progress between fixes
        tokio::task::yield_now().await;
    }

    match session.state() {
        NavigationState::Arrived { destination_name } => {
            tracing::info!("arrived at {destination_name}")
        }
        NavigationState::Active(active) => tracing::info!(
            "track ended {:.0} m before {} (eta {:.0} s)",
            active.remaining_distance_m,
            active.destination_name,
            active.estimated_time_remaining_s
        ),
        NavigationState::Idle => tracing::info!("session ended"),
    }
    tracing::info!(
        "fixes={} announcements={} off_route_fixes={} reroutes={}",
        summary.fixes,
        summary.announcements,
        summary.off_route_fixes,
        summary.reroutes
    );

    if let Some(path) = &args.snapped_out {
        write_trace(&snapped, "snapped", File::create(path)?)?;
        tracing::info!("snapped trace written to {path:?}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["replay", "--route", "route.json", "--track", "trace.gpx"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn interval_defaults_to_one_second() {
        assert_eq!(parse(&[]).unwrap().interval_ms, 1000);
    }

    #[test]
    fn interval_out_of_range_is_rejected() {
        assert!(parse(&["--interval-ms", "-250"]).is_err());
        assert!(parse(&["--interval-ms", "0"]).is_err());
        assert!(parse(&["--interval-ms", "3600001"]).is_err());
        assert_eq!(parse(&["--interval-ms", "250"]).unwrap().interval_ms, 250);
    }
}
