use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::announcer::ProgressiveAnnouncer;
use crate::arrival::CheckArrival;
use crate::config::NavigationConfig;
use crate::error::NavigationError;
use crate::eta::TrafficFactor;
use crate::models::{FixResponse, GeoPoint, GpsFix, NavigationState, Route, validate_route};
use crate::off_route::OffRouteDetector;
use crate::provider::RoutingProvider;
use crate::recalculate::{RecalculateRoute, seed_state};
use crate::update_location::UpdateLocation;
use crate::voice::VoiceService;

/// Minimum time between two off-route recalculation attempts.
const RECALCULATION_RETRY_SECS: i64 = 5;

/// Detector state scoped to one navigation session.
#[derive(Debug, Clone, Default)]
pub struct NavigationDetectors {
    pub off_route: OffRouteDetector,
    pub announcer: ProgressiveAnnouncer,
}

impl NavigationDetectors {
    pub fn from_config(config: &NavigationConfig) -> Self {
        Self {
            off_route: OffRouteDetector::new(config.off_route_confirmation()),
            announcer: ProgressiveAnnouncer::new(),
        }
    }

    pub fn reset(&mut self) {
        self.off_route.reset();
        self.announcer.reset();
    }
}

/// Why a recalculation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecalculationReason {
    OffRoute,
    Periodic,
}

/// An in-flight recalculation. Dropping it aborts the request.
struct PendingRecalculation {
    result: oneshot::Receiver<Option<Route>>,
    task: JoinHandle<()>,
}

impl Drop for PendingRecalculation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A single navigation session: the current state plus everything that
/// survives from one fix to the next.
///
/// Fixes must be fed one at a time through [`NavigationSession::handle_fix`].
/// Recalculation runs on a tokio task and is picked up by a later fix, so the
/// session keeps navigating on the old route meanwhile. At most one
/// recalculation is in flight, and ending or restarting the session cancels
/// it.
pub struct NavigationSession {
    config: NavigationConfig,
    update: UpdateLocation,
    arrival: CheckArrival,
    recalculate: RecalculateRoute,
    voice: Arc<dyn VoiceService>,
    state: NavigationState,
    detectors: NavigationDetectors,
    traffic: TrafficFactor,
    pending: Option<PendingRecalculation>,
    last_refresh_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl NavigationSession {
    pub fn new(
        config: NavigationConfig,
        provider: Arc<dyn RoutingProvider>,
        voice: Arc<dyn VoiceService>,
    ) -> Self {
        Self {
            update: UpdateLocation::from_config(&config),
            arrival: CheckArrival::from_config(&config),
            recalculate: RecalculateRoute::new(provider),
            detectors: NavigationDetectors::from_config(&config),
            config,
            voice,
            state: NavigationState::Idle,
            traffic: TrafficFactor::NEUTRAL,
            pending: None,
            last_refresh_at: None,
            last_attempt_at: None,
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn traffic_factor(&self) -> TrafficFactor {
        self.traffic
    }

    /// Sets the traffic multiplier used by the next ETA computations. The
    /// factor belongs to the running session and goes back to neutral on
    /// [`NavigationSession::end`].
    pub fn set_traffic_factor(&mut self, factor: f64) -> TrafficFactor {
        self.traffic = TrafficFactor::new(factor);
        tracing::info!("traffic factor set to {:.2}", self.traffic.value());
        self.traffic
    }

    pub fn is_recalculating(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts navigating `route`, replacing any running session.
    pub fn start(
        &mut self,
        route: Route,
        destination_name: impl Into<String>,
    ) -> Result<&NavigationState, NavigationError> {
        validate_route(&route)?;
        self.end();

        let origin = route.points[0];
        let active = seed_state(Arc::new(route), destination_name, origin, self.traffic);
        tracing::info!(
            "navigation to {} started: {:.0} m, {:.0} s, {} steps",
            active.destination_name,
            active.remaining_distance_m,
            active.estimated_time_remaining_s,
            active.route.steps.len()
        );
        self.state = NavigationState::Active(active);
        Ok(&self.state)
    }

    /// Ends the session, cancels a pending recalculation and drops the
    /// traffic factor.
    pub fn end(&mut self) {
        if self.pending.take().is_some() {
            tracing::info!("cancelled in-flight route recalculation");
        }
        if !matches!(self.state, NavigationState::Idle) {
            tracing::info!("navigation session ended");
        }
        self.detectors.reset();
        self.state = NavigationState::Idle;
        self.traffic = TrafficFactor::NEUTRAL;
        self.last_refresh_at = None;
        self.last_attempt_at = None;
    }

    pub fn handle_fix(&mut self, fix: GpsFix) -> FixResponse {
        self.poll_recalculation(&fix);

        if self.state.as_active().is_none() {
            return self.response(None);
        }

        let next = self
            .update
            .execute(&self.state, &fix, &mut self.detectors.off_route, self.traffic);
        let active = match &next {
            NavigationState::Active(active) => active,
            NavigationState::Idle | NavigationState::Arrived { .. } => return self.response(None),
        };

        if self.arrival.has_arrived(&fix, active) {
            tracing::info!("arrived at {}", active.destination_name);
            let destination_name = active.destination_name.clone();
            self.pending = None;
            self.detectors.reset();
            self.state = NavigationState::Arrived { destination_name };
            return self.response(None);
        }

        // A step can be left before any fix falls in its "now" band.
        let left_step = self
            .state
            .as_active()
            .filter(|prev| {
                Arc::ptr_eq(&prev.route, &active.route)
                    && active.current_step_index > prev.current_step_index
            })
            .map(|prev| (prev.current_step_index, prev.current_step.instruction.clone()));
        let missed_now = left_step.and_then(|(index, instruction)| {
            self.detectors.announcer.complete(index, &instruction)
        });
        let announcement = missed_now.or_else(|| {
            self.detectors.announcer.announce(
                active.current_step_index,
                &active.current_step.instruction,
                active.distance_to_next_maneuver_m,
            )
        });
        if let Some(text) = &announcement {
            self.voice.speak(text);
        }

        let is_off_route = active.is_off_route;
        self.state = next;
        self.maybe_recalculate(&fix, is_off_route);

        self.response(announcement)
    }

    fn response(&self, announcement: Option<String>) -> FixResponse {
        FixResponse {
            state: self.state.clone(),
            announcement,
            recalculating: self.is_recalculating(),
        }
    }

    /// Applies a finished recalculation, if any.
    fn poll_recalculation(&mut self, fix: &GpsFix) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        let outcome = match pending.result.try_recv() {
            Err(TryRecvError::Empty) => return,
            Ok(outcome) => outcome,
            Err(TryRecvError::Closed) => {
                tracing::warn!("route recalculation task ended without a result");
                None
            }
        };
        self.pending = None;

        let Some(route) = outcome else {
            return;
        };
        let NavigationState::Active(active) = &self.state else {
            return;
        };
        let destination_name = active.destination_name.clone();
        self.state = RecalculateRoute::apply(
            route,
            destination_name,
            fix.position(),
            &mut self.detectors,
            self.traffic,
        );
        self.last_refresh_at = Some(fix.timestamp);
    }

    fn maybe_recalculate(&mut self, fix: &GpsFix, is_off_route: bool) {
        let refreshed_at = *self.last_refresh_at.get_or_insert(fix.timestamp);
        if self.pending.is_some() {
            return;
        }

        let retry_ready = self.last_attempt_at.map_or(true, |at| {
            fix.timestamp - at >= TimeDelta::seconds(RECALCULATION_RETRY_SECS)
        });
        let reason = if is_off_route && retry_ready {
            Some(RecalculationReason::OffRoute)
        } else {
            self.config
                .recalculation_interval()
                .filter(|interval| fix.timestamp - refreshed_at >= *interval)
                .filter(|_| retry_ready)
                .map(|_| RecalculationReason::Periodic)
        };

        if let Some(reason) = reason {
            self.spawn_recalculation(fix, reason);
        }
    }

    fn spawn_recalculation(&mut self, fix: &GpsFix, reason: RecalculationReason) {
        let Some(destination) = self.state.as_active().and_then(|a| a.route.destination()) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available, skipping route recalculation");
            return;
        };

        let origin: GeoPoint = fix.position();
        let recalculate = self.recalculate.clone();
        let (tx, rx) = oneshot::channel();
        let task = runtime.spawn(async move {
            let route = recalculate.fetch(origin, destination).await;
            let _ = tx.send(route);
        });

        tracing::info!("requesting route recalculation ({reason:?}) from ({:.6}, {:.6})", origin.lat, origin.lon);
        self.pending = Some(PendingRecalculation { result: rx, task });
        self.last_attempt_at = Some(fix.timestamp);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::distance::polyline_length;
    use crate::models::Step;
    use crate::provider::DirectRouteProvider;
    use crate::voice::RecordingVoice;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn fix(point: GeoPoint, seconds: i64) -> GpsFix {
        GpsFix {
            lat: point.lat,
            lon: point.lon,
            speed_mps: 10.0,
            timestamp: at(seconds),
        }
    }

    /// 2 km eastwards, two steps.
    fn route() -> Route {
        let points: Vec<GeoPoint> = (0..=50)
            .map(|i| GeoPoint::new(45.0, 5.0 + i as f64 * 0.0005))
            .collect();
        let length = polyline_length(&points);
        Route {
            steps: vec![
                Step {
                    instruction: "Turn left".into(),
                    distance_m: 1000.0,
                },
                Step {
                    instruction: "Arrive at destination".into(),
                    distance_m: length - 1000.0,
                },
            ],
            points,
            total_distance_m: length,
            total_duration_s: 240.0,
        }
    }

    /// Holds every request until released, counting calls.
    struct GatedProvider {
        calls: AtomicUsize,
        release: Notify,
        answer: Option<Route>,
    }

    impl GatedProvider {
        fn new(answer: Option<Route>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                release: Notify::new(),
                answer,
            })
        }
    }

    #[async_trait]
    impl RoutingProvider for GatedProvider {
        async fn get_route(&self, _: GeoPoint, _: GeoPoint, _: bool) -> Option<Route> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.answer.clone()
        }
    }

    fn session(provider: Arc<dyn RoutingProvider>) -> (NavigationSession, Arc<RecordingVoice>) {
        let voice = Arc::new(RecordingVoice::new());
        let config = NavigationConfig {
            recalculation_interval_secs: None,
            ..NavigationConfig::default()
        };
        (NavigationSession::new(config, provider, voice.clone()), voice)
    }

    async fn wait_for_result(session: &NavigationSession) {
        for _ in 0..100 {
            if let Some(pending) = &session.pending {
                if pending.task.is_finished() {
                    return;
                }
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("recalculation did not finish");
    }

    #[tokio::test]
    async fn rejects_invalid_route_at_start() {
        let (mut session, _) = session(Arc::new(DirectRouteProvider::default()));
        let mut bad = route();
        bad.steps.clear();
        assert!(matches!(
            session.start(bad, "Nowhere"),
            Err(NavigationError::InvalidRoute(_))
        ));
        assert_eq!(*session.state(), NavigationState::Idle);
    }

    #[tokio::test]
    async fn idle_session_ignores_fixes() {
        let (mut session, voice) = session(Arc::new(DirectRouteProvider::default()));
        let response = session.handle_fix(fix(GeoPoint::new(45.0, 5.0), 0));
        assert_eq!(response.state, NavigationState::Idle);
        assert!(voice.spoken().is_empty());
    }

    #[tokio::test]
    async fn drive_to_destination_announces_and_arrives() {
        let (mut session, voice) = session(Arc::new(DirectRouteProvider::default()));
        let r = route();
        let points = r.points.clone();
        session.start(r, "Bellecour").unwrap();

        let mut second = 0;
        for point in &points {
            let response = session.handle_fix(fix(*point, second));
            second += 1;
            if response.state.is_arrived() {
                break;
            }
        }

        assert_eq!(
            *session.state(),
            NavigationState::Arrived {
                destination_name: "Bellecour".into()
            }
        );
        let spoken = voice.spoken();
        assert_eq!(
            spoken,
            vec![
                "In 500 meters, Turn left",
                "In 200 meters, Turn left",
                "In 50 meters, Turn left",
                "Turn left now",
                "In 500 meters, Arrive at destination",
                "In 200 meters, Arrive at destination",
            ]
        );
    }

    #[tokio::test]
    async fn arrived_is_terminal() {
        let (mut session, _) = session(Arc::new(DirectRouteProvider::default()));
        let r = route();
        let last = *r.points.last().unwrap();
        session.start(r, "Bellecour").unwrap();

        assert!(session.handle_fix(fix(last, 0)).state.is_arrived());
        let response = session.handle_fix(fix(GeoPoint::new(45.0, 5.0), 1));
        assert!(response.state.is_arrived());
    }

    #[tokio::test]
    async fn off_route_triggers_single_recalculation_and_applies_it() {
        let destination = *route().points.last().unwrap();
        let detour = GeoPoint::new(45.002, 5.005);
        let replacement = DirectRouteProvider::default().build_route(detour, destination);
        let provider = GatedProvider::new(Some(replacement.clone()));
        let (mut session, _) = session(provider.clone());
        session.start(route(), "Bellecour").unwrap();

        for second in 0..=3 {
            session.handle_fix(fix(detour, second));
        }
        assert!(session.is_recalculating());
        let active = session.state().as_active().unwrap();
        assert!(active.is_off_route);

        // still off route while the request is in flight: no second request
        for second in 4..10 {
            let response = session.handle_fix(fix(detour, second));
            assert!(response.recalculating);
            assert!(response.state.as_active().is_some());
        }
        provider.release.notify_one();
        wait_for_result(&session).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let response = session.handle_fix(fix(detour, 10));
        assert!(!response.recalculating);
        let active = response.state.as_active().unwrap();
        assert_eq!(*active.route, replacement);
        assert!(!active.is_off_route);
        assert!(active.distance_to_route_m < 1.0);
    }

    #[tokio::test]
    async fn failed_recalculation_keeps_route() {
        let provider = GatedProvider::new(None);
        let (mut session, _) = session(provider.clone());
        let original = route();
        session.start(original.clone(), "Bellecour").unwrap();

        let detour = GeoPoint::new(45.002, 5.005);
        for second in 0..=3 {
            session.handle_fix(fix(detour, second));
        }
        assert!(session.is_recalculating());
        tokio::task::yield_now().await;
        provider.release.notify_one();
        wait_for_result(&session).await;

        let response = session.handle_fix(fix(detour, 4));
        let active = response.state.as_active().unwrap();
        assert_eq!(*active.route, original);
        assert!(active.is_off_route);
        // retry waits for the backoff
        assert!(!response.recalculating);
        let response = session.handle_fix(fix(detour, 8));
        assert!(response.recalculating);
    }

    #[tokio::test]
    async fn ending_session_cancels_recalculation() {
        let provider = GatedProvider::new(Some(route()));
        let (mut session, _) = session(provider.clone());
        session.start(route(), "Bellecour").unwrap();

        let detour = GeoPoint::new(45.002, 5.005);
        for second in 0..=3 {
            session.handle_fix(fix(detour, second));
        }
        assert!(session.is_recalculating());

        session.end();
        assert!(!session.is_recalculating());
        assert_eq!(*session.state(), NavigationState::Idle);

        // a new session never sees the old request
        session.start(route(), "Part-Dieu").unwrap();
        provider.release.notify_waiters();
        tokio::task::yield_now().await;
        let response = session.handle_fix(fix(route().points[1], 4));
        let active = response.state.as_active().unwrap();
        assert_eq!(active.destination_name, "Part-Dieu");
        assert!(!response.recalculating);
    }

    #[tokio::test]
    async fn periodic_refresh_requests_new_route() {
        let provider = GatedProvider::new(None);
        let voice = Arc::new(RecordingVoice::new());
        let config = NavigationConfig {
            recalculation_interval_secs: Some(30.0),
            ..NavigationConfig::default()
        };
        let mut session = NavigationSession::new(config, provider.clone(), voice);
        let r = route();
        let points = r.points.clone();
        session.start(r, "Bellecour").unwrap();

        session.handle_fix(fix(points[0], 0));
        assert!(!session.is_recalculating());
        session.handle_fix(fix(points[1], 29));
        assert!(!session.is_recalculating());
        session.handle_fix(fix(points[2], 30));
        assert!(session.is_recalculating());
    }

    #[tokio::test]
    async fn traffic_factor_is_clamped_and_applied() {
        let (mut session, _) = session(Arc::new(DirectRouteProvider::default()));
        assert_eq!(session.set_traffic_factor(9.0).value(), 3.0);
        let r = route();
        let mid = r.points[25];
        session.start(r, "Bellecour").unwrap();
        session.set_traffic_factor(1.8);

        let response = session.handle_fix(fix(mid, 0));
        let active = response.state.as_active().unwrap();
        let neutral = active.route.total_duration_s * active.remaining_distance_m
            / active.route.total_distance_m;
        assert!((active.estimated_time_remaining_s - neutral * 1.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn traffic_factor_does_not_outlive_session() {
        let (mut session, _) = session(Arc::new(DirectRouteProvider::default()));
        session.start(route(), "Bellecour").unwrap();
        session.set_traffic_factor(2.5);
        session.end();
        assert_eq!(session.traffic_factor(), TrafficFactor::NEUTRAL);

        let next = route();
        let duration = next.total_duration_s;
        let state = session.start(next, "Part-Dieu").unwrap();
        let active = state.as_active().unwrap();
        assert_eq!(active.estimated_time_remaining_s, duration);
    }

    /// Drives every vertex of `route` at one fix per second until arrival.
    fn drive(session: &mut NavigationSession, route: &Route) -> Vec<String> {
        let mut spoken = Vec::new();
        for (second, point) in route.points.iter().enumerate() {
            let response = session.handle_fix(fix(*point, second as i64));
            spoken.extend(response.announcement);
            if response.state.is_arrived() {
                break;
            }
        }
        spoken
    }

    fn eastbound(vertices: usize, spacing_deg: f64, steps: &[(&str, f64)]) -> Route {
        let points: Vec<GeoPoint> = (0..vertices)
            .map(|i| GeoPoint::new(45.0, 5.0 + i as f64 * spacing_deg))
            .collect();
        let length = polyline_length(&points);
        let mut steps: Vec<Step> = steps
            .iter()
            .map(|(instruction, distance_m)| Step {
                instruction: (*instruction).into(),
                distance_m: *distance_m,
            })
            .collect();
        let planned: f64 = steps.iter().map(|s| s.distance_m).sum();
        steps.push(Step {
            instruction: "Arrive at destination".into(),
            distance_m: length - planned,
        });
        Route {
            points,
            steps,
            total_distance_m: length,
            total_duration_s: 240.0,
        }
    }

    #[tokio::test]
    async fn repeated_instruction_is_announced_for_each_maneuver() {
        let (mut session, voice) = session(Arc::new(DirectRouteProvider::default()));
        // ~39 m between vertices
        let r = eastbound(51, 0.0005, &[("Turn left", 700.0), ("Turn left", 700.0)]);
        session.start(r.clone(), "Bellecour").unwrap();

        let spoken = drive(&mut session, &r);
        assert!(session.state().is_arrived());
        assert_eq!(
            spoken,
            vec![
                "In 500 meters, Turn left",
                "In 200 meters, Turn left",
                "In 50 meters, Turn left",
                "Turn left now",
                "In 500 meters, Turn left",
                "In 200 meters, Turn left",
                "In 50 meters, Turn left",
                "Turn left now",
                "In 500 meters, Arrive at destination",
                "In 200 meters, Arrive at destination",
            ]
        );
        assert_eq!(voice.spoken(), spoken);
    }

    #[tokio::test]
    async fn dense_route_speaks_each_now_cue_once() {
        let (mut session, _) = session(Arc::new(DirectRouteProvider::default()));
        // ~3.9 m between vertices
        let r = eastbound(301, 0.00005, &[("Turn left", 500.0), ("Turn right", 400.0)]);
        session.start(r.clone(), "Bellecour").unwrap();

        let spoken = drive(&mut session, &r);
        assert!(session.state().is_arrived());
        let count = |text: &str| spoken.iter().filter(|s| s.as_str() == text).count();
        assert_eq!(count("Turn left now"), 1);
        assert_eq!(count("Turn right now"), 1);
        assert_eq!(count("In 50 meters, Turn left"), 1);
        assert_eq!(count("In 50 meters, Turn right"), 1);

        let left_now = spoken.iter().position(|s| s == "Turn left now").unwrap();
        let right_500 = spoken
            .iter()
            .position(|s| s == "In 500 meters, Turn right")
            .unwrap();
        assert!(left_now < right_500);
    }
}
