//! Advection and source behaviour of complete solver steps

mod common;

use approx::assert_abs_diff_eq;
use common::{fluid_cells, fluid_sum, quiescent_settings};
use fluid_sim_core::{AdvectionType, CpuBackend, FieldKind, FluidSettings, GridDimensions, Solver};

#[test]
fn test_quiescent_step_is_exact_noop() {
    for scheme in [AdvectionType::Normal, AdvectionType::MacCormack] {
        let settings = FluidSettings {
            advection_type: scheme,
            ..quiescent_settings(10)
        };
        let mut solver = Solver::new(CpuBackend::new(), settings).unwrap();
        solver.fill_field(FieldKind::Density, 0.5).unwrap();
        solver.fill_field(FieldKind::Temperature, 2.0).unwrap();
        let density = solver.read_density().unwrap();
        let temperature = solver.read_field(FieldKind::Temperature).unwrap();

        for _ in 0..3 {
            solver.step(0.1).unwrap();
        }

        for (after, before) in solver.read_density().unwrap().iter().zip(&density) {
            assert_abs_diff_eq!(*after, *before, epsilon = 1e-6);
        }
        let after = solver.read_field(FieldKind::Temperature).unwrap();
        for (after, before) in after.iter().zip(&temperature) {
            assert_abs_diff_eq!(*after, *before, epsilon = 1e-6);
        }
        assert!(solver
            .read_field(FieldKind::Velocity)
            .unwrap()
            .iter()
            .all(|v| *v == 0.0));
    }
}

#[test]
fn test_maccormack_preserves_constant_field_in_uniform_flow() {
    let settings = FluidSettings {
        advection_type: AdvectionType::MacCormack,
        ..quiescent_settings(12)
    };
    let mut solver = Solver::new(CpuBackend::new(), settings).unwrap();
    let dims = solver.dimensions();

    let velocity: Vec<f32> = (0..dims.cell_count())
        .flat_map(|_| [7.0, -4.0, 3.0, 0.0])
        .collect();
    solver.upload_field(FieldKind::Velocity, &velocity).unwrap();
    solver
        .upload_field(FieldKind::Density, &vec![1.0; dims.cell_count()])
        .unwrap();

    solver.step(0.1).unwrap();

    let obstacle = solver.read_field(FieldKind::Obstacle).unwrap();
    let density = solver.read_density().unwrap();
    for cell in fluid_cells(&obstacle) {
        assert_abs_diff_eq!(density[cell], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn test_uniform_flow_carries_blob_downstream() {
    let mut solver = Solver::new(CpuBackend::new(), quiescent_settings(16)).unwrap();
    let dims = solver.dimensions();

    // Gaussian blob of radius 3 centred at (5, 8, 8), clear of every wall
    let mut blob = vec![0.0_f32; dims.cell_count()];
    for z in 0..dims.z {
        for y in 0..dims.y {
            for x in 0..dims.x {
                let d = [x as f32 - 5.0, y as f32 - 8.0, z as f32 - 8.0];
                let dist_sq = d.iter().map(|v| v * v).sum::<f32>();
                if dist_sq < 9.0 {
                    blob[dims.index(x, y, z)] = (-dist_sq / 9.0).exp();
                }
            }
        }
    }
    solver.upload_field(FieldKind::Density, &blob).unwrap();

    // 10 cells per unit time at time_step 0.1 is one cell per step
    let velocity: Vec<f32> = (0..dims.cell_count())
        .flat_map(|_| [10.0, 0.0, 0.0, 0.0])
        .collect();
    solver.upload_field(FieldKind::Velocity, &velocity).unwrap();

    let centroid_x = |density: &[f32]| {
        let mut weighted = 0.0_f64;
        let mut total = 0.0_f64;
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let d = f64::from(density[dims.index(x, y, z)]);
                    weighted += d * f64::from(x);
                    total += d;
                }
            }
        }
        (weighted / total, total)
    };

    let (before, mass) = centroid_x(&solver.read_density().unwrap());
    assert!(mass > 1.0, "blob holds no density");
    assert_abs_diff_eq!(before, 5.0, epsilon = 1e-3);

    solver.step(0.1).unwrap();

    let (after, moved_mass) = centroid_x(&solver.read_density().unwrap());
    assert_abs_diff_eq!(after, 6.0, epsilon = 1e-3);
    assert_abs_diff_eq!(moved_mass, mass, epsilon = 1e-3 * mass);
}

#[test]
fn test_constant_source_accumulates_smoke() {
    let settings = FluidSettings {
        dimensions: GridDimensions::cube(32),
        jacobi_iterations: 40,
        ..FluidSettings::default()
    };
    let mut solver = Solver::new(CpuBackend::new(), settings).unwrap();
    let obstacle = solver.read_field(FieldKind::Obstacle).unwrap();
    let fluid = fluid_cells(&obstacle);

    let mut totals = Vec::with_capacity(100);
    for _ in 0..100 {
        solver.step(1.0 / 60.0).unwrap();
        let density = solver.read_density().unwrap();
        assert!(density.iter().all(|d| d.is_finite()));
        totals.push(fluid_sum(&density, &fluid));
    }

    let first = totals[0];
    assert!(first > 0.0);

    // Until the plume reaches the ceiling the source outweighs every loss
    for (step, pair) in totals[..20].windows(2).enumerate() {
        assert!(
            pair[1] >= pair[0],
            "total dropped after step {}: {:?}",
            step + 1,
            &totals[..20]
        );
    }
    assert!(totals[19] > 5.0 * first);

    // Dissipation catches up with the source: growth levels off
    let early_growth = totals[9] - totals[0];
    let late_growth = totals[99] - totals[89];
    assert!(
        late_growth < 0.75 * early_growth,
        "growth over the first 10 steps {early_growth}, over the last 10 {late_growth}"
    );
    assert!(totals[99] < 150.0 * first, "totals: {:?}", &totals[90..]);

    let stats = solver.stats();
    assert_eq!(stats.steps, 100);
    assert_abs_diff_eq!(stats.simulated_time, 100.0 / 60.0, epsilon = 1e-4);
}
