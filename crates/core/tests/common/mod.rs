#![allow(dead_code)]
//! Shared helpers for the solver integration tests

use fluid_sim_core::{FluidSettings, GridDimensions};

#[ctor::ctor]
fn init_logging() {
    // RUST_LOG=fluid_sim_core=debug cargo test shows solver logs
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Settings with every force, source and loss switched off
pub fn quiescent_settings(size: u32) -> FluidSettings {
    FluidSettings {
        dimensions: GridDimensions::cube(size),
        density_buoyancy: 0.0,
        density_weight: 0.0,
        vorticity_strength: 0.0,
        temperature_dissipation: 1.0,
        density_dissipation: 1.0,
        velocity_dissipation: 1.0,
        constant_density_amount: 0.0,
        constant_temperature: 0.0,
        ..FluidSettings::default()
    }
}

/// Indices of cells the obstacle mask marks as fluid
pub fn fluid_cells(obstacle: &[f32]) -> Vec<usize> {
    obstacle
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < 0.5)
        .map(|(i, _)| i)
        .collect()
}

/// Sum of a scalar field over fluid cells
pub fn fluid_sum(field: &[f32], fluid: &[usize]) -> f64 {
    fluid.iter().map(|&i| f64::from(field[i])).sum()
}

/// Euclidean norm of a scalar field
pub fn l2_norm(field: &[f32]) -> f64 {
    field
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}
