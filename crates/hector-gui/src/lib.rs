//! Hector GUI - Web interface for simulated missions
//!
//! Features:
//! - Mission and plant parameters via query string
//! - Full mission run via API
//! - 2D charts over time and a 3D flight path
//! - State transition timeline

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use hector_core::{MissionParams, ReturnCondition, Sampling};
use hector_sim::{run_mission, PlantParams, SimParams, SimResult};
use serde::Serialize;
use std::collections::HashMap;
use tower_http::services::ServeDir;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Creates the Axum router with all routes
pub fn create_router() -> Router {
    Router::new()
        .route("/api/mission", get(handle_mission))
        .route("/api/chart/{chart_type}", get(handle_chart_data))
        .fallback_service(ServeDir::new("crates/hector-gui/templates"))
}

/// Parse simulation parameters from query parameters. Unknown or
/// unparsable values keep their defaults.
fn parse_config(params: &HashMap<String, String>) -> SimParams {
    let mut mission = MissionParams::default();
    let mut plant = PlantParams::default();
    let mut max_time = hector_sim::sim::MAX_TIME;

    macro_rules! parse_param {
        ($target:ident . $field:ident, $type:ty) => {
            if let Some(val) = params
                .get(stringify!($field))
                .and_then(|v| v.parse::<$type>().ok())
            {
                $target.$field = val;
            }
        };
    }

    parse_param!(mission.cruise_height, f64);
    parse_param!(mission.height_tolerance, f64);
    parse_param!(mission.look_ahead, f64);
    parse_param!(mission.close_enough, f64);
    parse_param!(mission.average_speed, f64);
    parse_param!(mission.initial_x, f64);
    parse_param!(mission.initial_y, f64);
    parse_param!(mission.initial_z, f64);
    parse_param!(mission.tick_rate_hz, f64);
    parse_param!(plant.target_speed, f64);
    parse_param!(plant.estimator_delay, f64);
    parse_param!(plant.pose_noise_std, f64);
    parse_param!(plant.velocity_noise_std, f64);
    parse_param!(plant.seed, u64);

    if let Some(goals) = params.get("goals").filter(|g| !g.trim().is_empty()) {
        mission.goals = Some(goals.clone());
    }
    match params.get("sampling").map(String::as_str) {
        Some("arc-length") => mission.sampling = Sampling::ArcLength,
        Some("time") => mission.sampling = Sampling::Time,
        _ => {}
    }
    match params.get("return_condition").map(String::as_str) {
        Some("mission-signal") => mission.return_condition = ReturnCondition::MissionSignal,
        Some("reached-home") => mission.return_condition = ReturnCondition::ReachedHome,
        Some("either") => mission.return_condition = ReturnCondition::Either,
        _ => {}
    }
    if let Some(t) = params.get("max_time").and_then(|v| v.parse::<f64>().ok()) {
        max_time = t;
    }

    SimParams {
        mission,
        plant,
        max_time,
    }
}

fn simulate(params: &HashMap<String, String>) -> Result<MissionResponse, (StatusCode, String)> {
    let config = parse_config(params);
    run_mission(&config)
        .map(|res| MissionResponse::from_result(&res))
        .map_err(|e| {
            tracing::warn!("rejected mission request: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        })
}

/// Handle mission request
async fn handle_mission(
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<MissionResponse> {
    simulate(&params).map(Json)
}

/// Handle specific chart data requests
async fn handle_chart_data(
    Path(chart_type): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ChartData> {
    simulate(&params).map(|results| Json(generate_chart_data(&chart_type, results)))
}

/// Full mission response
#[derive(Debug, Serialize)]
struct MissionResponse {
    time: Vec<f64>,
    position_x: Vec<f64>,
    position_y: Vec<f64>,
    position_z: Vec<f64>,
    speed: Vec<f64>,
    heading: Vec<f64>,
    target_x: Vec<f64>,
    target_y: Vec<f64>,
    target_distance: Vec<f64>,
    state: Vec<&'static str>,
    rotate: Vec<bool>,
    waypoints: Vec<usize>,
    state_changes: Vec<StateChange>,
    home: [f64; 3],
    goal: [f64; 2],
    idle_ticks: u64,
    success: bool,
}

#[derive(Debug, Serialize)]
struct StateChange {
    time: f64,
    state: &'static str,
}

impl MissionResponse {
    fn from_result(res: &SimResult) -> Self {
        Self {
            time: res.time.clone(),
            position_x: res.position.iter().map(|p| p.x).collect(),
            position_y: res.position.iter().map(|p| p.y).collect(),
            position_z: res.position.iter().map(|p| p.z).collect(),
            speed: res.velocity.iter().map(|v| v.norm()).collect(),
            heading: res.heading.clone(),
            target_x: res.target.iter().map(|t| t.x).collect(),
            target_y: res.target.iter().map(|t| t.y).collect(),
            target_distance: res
                .position
                .iter()
                .zip(&res.target)
                .map(|(p, t)| (p.xy() - t).norm())
                .collect(),
            state: res.state.iter().map(|s| s.label()).collect(),
            rotate: res.rotate.clone(),
            waypoints: res.waypoints.clone(),
            state_changes: res
                .transitions
                .iter()
                .map(|&(state, time)| StateChange {
                    time,
                    state: state.label(),
                })
                .collect(),
            home: [res.home.x, res.home.y, res.home.z],
            goal: [res.goal.x, res.goal.y],
            idle_ticks: res.idle_ticks,
            success: res.completed,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChartData {
    time: Vec<f64>,
    data: Vec<f64>,
    data_3d: Option<(Vec<f64>, Vec<f64>, Vec<f64>)>,
    title: String,
    y_label: String,
    chart_type: String,
}

impl ChartData {
    fn series(time: Vec<f64>, data: Vec<f64>, title: &str, y_label: &str) -> Self {
        Self {
            time,
            data,
            data_3d: None,
            title: title.to_string(),
            y_label: y_label.to_string(),
            chart_type: "2d".to_string(),
        }
    }
}

fn generate_chart_data(chart_type: &str, results: MissionResponse) -> ChartData {
    match chart_type {
        "speed" => ChartData::series(results.time, results.speed, "Speed vs Time", "Speed (m/s)"),
        "heading" => {
            ChartData::series(results.time, results.heading, "Heading vs Time", "Heading (rad)")
        }
        "distance" => ChartData::series(
            results.time,
            results.target_distance,
            "Distance to Target vs Time",
            "Planar distance (m)",
        ),
        "trajectory" => ChartData {
            time: results.time,
            data: vec![],
            data_3d: Some((results.position_x, results.position_y, results.position_z)),
            title: "3D Flight Path".to_string(),
            y_label: "Position (m)".to_string(),
            chart_type: "3d".to_string(),
        },
        _ => ChartData::series(
            results.time,
            results.position_z,
            "Altitude vs Time",
            "Altitude (m)",
        ),
    }
}
