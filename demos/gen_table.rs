//! Generate a phase table for validation testing

fn main() {
    let knee: Vec<f64> = (0..320)
        .map(|i| 30.0 + 25.0 * (i as f64 * std::f64::consts::TAU / 100.0).sin())
        .collect();
    let trial = serde_json::json!({
        "schema_version": gait_flux::SCHEMA_VERSION,
        "subject": "AB01",
        "task": { "task": "level_walking", "task_id": "level_1.2", "task_info": "speed_m_s:1.2" },
        "events": { "left_heel_strike": [50, 150, 252], "right_heel_strike": [0, 100, 205, 300] },
        "kinematics": {
            "rate_hz": 100.0,
            "unit": "deg",
            "channels": { "knee_flexion_angle": { "left": knee, "right": knee } }
        }
    });

    let config = gait_flux::PipelineConfig::default();
    let encoded = gait_flux::transform_json(&trial.to_string(), &config)
        .and_then(|output| gait_flux::TableEncoder::new().encode_ndjson(&output.table));
    match encoded {
        Ok(table) => print!("{table}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
