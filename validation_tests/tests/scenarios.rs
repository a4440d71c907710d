//! End-to-end regression scenarios for the springls engine.

use springls_validation::harness::{run_scenario, sphere_signed_field};
use springls_validation::metrics::{hausdorff_distance, max_sphere_deviation, mean_surface_distance};
use springls_validation::scenarios::deformation::{
    deformation_scenario, DEFORMATION_CENTER, DEFORMATION_RADIUS,
};
use springls_validation::scenarios::rotation::{ROTATION_OFFSET, ROTATION_RADIUS};
use springls_validation::scenarios::{rotation_scenario, static_sphere_scenario};
use springls3d::levelset::NarrowBandEvolver;
use springls3d::solver::{Contractor, ENRIGHT_PERIOD};
use springls3d::{SimulationContext, SimulationParams, SpringlsError, SpringlsPipeline};

#[test]
fn static_sphere_is_inert() {
    let steps = 10;
    let (run, _) = run_scenario(static_sphere_scenario(128, steps)).unwrap();

    let initial = run.initial();
    let last = run.last();
    assert_eq!(run.steps_taken, steps);
    assert_eq!(initial.num_springls, last.num_springls);

    // With every weight zeroed, vertex positions are bitwise stable up to
    // floating epsilon.
    assert_eq!(initial.vertices.len(), last.vertices.len());
    let mut max_drift = 0.0f32;
    for (a, b) in initial.vertices.iter().zip(&last.vertices) {
        for axis in 0..3 {
            max_drift = max_drift.max((a[axis] - b[axis]).abs());
        }
    }
    assert!(max_drift < 1.0e-4, "static sphere drifted by {max_drift}");
}

#[test]
fn rotation_returns_to_the_start() {
    let grid = 48;
    let period = 192;
    let (run, _) = run_scenario(rotation_scenario(grid, period)).unwrap();
    assert_eq!(run.steps_taken, period);

    let initial = run.initial();
    let last = run.last();
    assert!(last.num_springls > 0);

    // One full revolution must bring the surface back onto itself, up to
    // a few cells of numerical drift.
    let hausdorff = hausdorff_distance(&initial.vertices, &last.vertices);
    let mean = mean_surface_distance(&initial.vertices, &last.vertices);
    assert!(hausdorff < 5.0, "hausdorff after one period: {hausdorff}");
    assert!(mean < 2.0, "mean surface distance after one period: {mean}");

    // And it must still be the same sphere.
    let deviation = max_sphere_deviation(
        last,
        [0.5 + ROTATION_OFFSET, 0.5, 0.5],
        ROTATION_RADIUS,
        grid,
    );
    assert!(deviation < 5.0, "sphere deformed by {deviation} cells");

    // Sanity check on the scenario itself: partway through the period the
    // surface must be far from its start, so the final agreement is not
    // just a surface that never moved.
    let halfway = run
        .snapshots
        .iter()
        .find(|s| s.step == period / 2)
        .expect("halfway snapshot");
    let hausdorff = hausdorff_distance(&initial.vertices, &halfway.vertices);
    // At half a period the sphere center is diametrically opposite, two
    // offsets away.
    let expected = 2.0 * ROTATION_OFFSET * grid as f32;
    assert!(
        hausdorff > 0.5 * expected,
        "surface barely moved by half period: {hausdorff}"
    );
}

#[test]
fn catastrophic_contraction_raises_the_fatal_error() {
    let field = sphere_signed_field(48, [0.5, 0.5, 0.5], 0.25);
    let mut ctx = SimulationContext::new(field);
    NarrowBandEvolver::new().rebuild_narrow_band(&mut ctx);

    let mut springls =
        springls3d::sampling::extract_springls(&ctx.signed.current, ctx.scale_down);
    // Collapse almost every element far away from the surface.
    let keep = springls.len() / 20;
    for s in springls.iter_mut().skip(keep) {
        for v in s.vertexes.iter_mut() {
            *v *= 0.01;
        }
        s.recenter_particle();
    }
    let labels = vec![0u32; springls.len()];
    ctx.adopt_particles(springls, labels);

    let result = Contractor::new().contract(&mut ctx, &SimulationParams::default(), false);
    assert!(matches!(
        result,
        Err(SpringlsError::CatastrophicContraction { .. })
    ));
}

#[test]
fn deformation_returns_to_the_start() {
    // The deformation field is periodic in simulated time, which the CFL
    // bound decouples from driver steps; drive the pipeline directly
    // until one full period has elapsed.
    let grid = 32;
    let scenario = deformation_scenario(grid, 1000);
    let field = sphere_signed_field(grid, DEFORMATION_CENTER, DEFORMATION_RADIUS);
    let mut ctx = SimulationContext::new(field);
    let mut pipeline = SpringlsPipeline::new(scenario.params, scenario.mode).unwrap();
    pipeline.init(&mut ctx).unwrap();

    let initial = pipeline.springls_surface(&ctx).vertices;
    let mut halfway: Option<Vec<[f32; 3]>> = None;
    while pipeline.simulated_time() < ENRIGHT_PERIOD {
        let more = pipeline.step(&mut ctx).unwrap();
        assert!(more, "solve terminated before one deformation period");
        if halfway.is_none() && pipeline.simulated_time() >= ENRIGHT_PERIOD / 2.0 {
            halfway = Some(pipeline.springls_surface(&ctx).vertices);
        }
    }
    let last = pipeline.springls_surface(&ctx).vertices;

    // At the reversal point the surface must be visibly stretched, so the
    // final agreement is not a surface that never moved.
    let stretched = hausdorff_distance(&initial, &halfway.expect("reversal snapshot"));
    assert!(
        stretched > 2.0,
        "surface barely deformed by the reversal point: {stretched}"
    );

    // The time reversal undoes the flow; the surface must land back on
    // its start, up to a few cells of resampling drift.
    let hausdorff = hausdorff_distance(&initial, &last);
    let mean = mean_surface_distance(&initial, &last);
    assert!(hausdorff < 5.0, "hausdorff after one period: {hausdorff}");
    assert!(mean < 2.0, "mean surface distance after one period: {mean}");
}
