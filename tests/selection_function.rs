//! End-to-end checks of the selection pipeline, from noise rasters to
//! survey-average surfaces, mass limits, and catalog projection.

use anyhow::Result;
use approx::assert_relative_eq;
use ndarray::Array2;
use selfn::{
    calc_completeness, calc_mass_limit, completeness_by_footprint, mass_limit_per_noise_level,
    ArtifactCache, CatalogEntry, CompletenessMethod, CosmologyParams, FilterResponse,
    FootprintCollection, FootprintTile, MassConverter, MzGrid, NoiseBin, NoiseTable,
    ScalingRelation, SelectionFunctionStore, StoreOptions, SurveyModel, TileRecord, TileRasters,
};

fn survey_grid() -> Result<MzGrid> {
    Ok(MzGrid::from_ranges(13.0, 16.0, 61, 0.1, 1.1, 0.1)?)
}

fn survey_model(grid: &MzGrid) -> Result<SurveyModel> {
    let counts = SurveyModel::uniform_counts(grid);
    Ok(SurveyModel::new(
        CosmologyParams::default(),
        grid.clone(),
        400.0,
        counts,
        148.0,
    )?)
}

fn single_level_table(rms: f64, area: f64) -> Result<NoiseTable> {
    Ok(NoiseTable::from_bins(vec![NoiseBin {
        y0_rms: rms,
        area_deg2: area,
    }])?)
}

#[test]
fn noise_rasters_through_survey_average() -> Result<()> {
    // Two tiles with block-constant noise rasters, half-arcmin pixels
    let deep = TileRasters::with_uniform_pixels(
        Array2::from_elem((60, 60), 2e-5),
        Array2::ones((60, 60)),
        0.25,
    )?;
    let mut shallow_noise = Array2::from_elem((60, 60), 4e-5);
    shallow_noise.slice_mut(ndarray::s![..30, ..]).fill(6e-5);
    let shallow = TileRasters::with_uniform_pixels(shallow_noise, Array2::ones((60, 60)), 0.25)?;

    let deep_table = NoiseTable::build(&deep, None)?;
    let shallow_table = NoiseTable::build(&shallow, None)?;
    assert_eq!(deep_table.len(), 1);
    assert_eq!(shallow_table.len(), 2);

    let grid = survey_grid()?;
    let mut store = SelectionFunctionStore::new(
        vec![
            TileRecord::new("deep", deep_table, FilterResponse::unity(), None),
            TileRecord::new("shallow", shallow_table, FilterResponse::unity(), None),
        ],
        5.0,
        ScalingRelation::upp_default(),
        grid.clone(),
        StoreOptions {
            downsample_step: Some(1e-7),
            mass_function_debias: false,
            obs_freq_ghz: 148.0,
        },
    )?;

    let weight_sum: f64 = store.area_weights().iter().sum();
    assert_relative_eq!(weight_sum, 1.0, epsilon = 1e-9);

    store.update(CosmologyParams::default(), None, |_, g| {
        SurveyModel::uniform_counts(g)
    })?;

    let average = store.survey_average()?;
    let (nz, nm) = grid.shape();
    for k in 0..nz {
        for j in 0..nm {
            let c = average[[k, j]];
            assert!((0.0..=1.0).contains(&c));
            if j > 0 {
                assert!(c >= average[[k, j - 1]] - 1e-9, "not monotone at ({k},{j})");
            }
        }
    }
    // The deepest tile bounds the average from above
    let surfaces = store.tile_surfaces()?;
    for (avg, deep) in average.iter().zip(surfaces[0].iter()) {
        assert!(*avg <= *deep + 1e-9);
    }
    Ok(())
}

#[test]
fn detection_transition_follows_predicted_signal() -> Result<()> {
    let grid = survey_grid()?;
    let model = survey_model(&grid)?;
    // Near-zero intrinsic scatter so the transition width is set by the
    // measurement error alone
    let scaling = ScalingRelation::new(1e-4, 0.0, 3e14, 1e-6)?;
    let noise = single_level_table(2e-5, 400.0)?;
    let snr_cut = 5.0;
    let threshold = snr_cut * 2e-5;

    let comp = calc_completeness(
        &noise,
        snr_cut,
        &model,
        &scaling,
        &FilterResponse::unity(),
        None,
        CompletenessMethod::Fast,
        None,
    )?;

    let (nz, nm) = grid.shape();
    let mut below = 0usize;
    let mut above = 0usize;
    for k in 0..nz {
        for j in 0..nm {
            let y0 = model.predict_y0(&scaling, &FilterResponse::unity(), k, j);
            let c = comp[[k, j]];
            if y0 < 0.5 * threshold {
                assert!(c < 0.01, "comp {c} at y0 {y0} below half threshold");
                below += 1;
            } else if y0 > 2.0 * threshold {
                assert!(c > 0.99, "comp {c} at y0 {y0} above twice threshold");
                above += 1;
            }
        }
    }
    // The grid must actually straddle the transition
    assert!(below > 0 && above > 0);
    Ok(())
}

#[test]
fn monte_carlo_agrees_with_analytic() -> Result<()> {
    let grid = MzGrid::from_ranges(13.5, 15.5, 41, 0.1, 1.1, 0.1)?;
    let model = survey_model(&grid)?;
    let scaling = ScalingRelation::upp_default();
    let noise = single_level_table(2e-5, 400.0)?;

    let fast = calc_completeness(
        &noise,
        5.0,
        &model,
        &scaling,
        &FilterResponse::unity(),
        Some(0.5),
        CompletenessMethod::Fast,
        None,
    )?;
    let mc = calc_completeness(
        &noise,
        5.0,
        &model,
        &scaling,
        &FilterResponse::unity(),
        Some(0.5),
        CompletenessMethod::MonteCarlo {
            num_draws: 20_000,
            num_iterations: 5,
        },
        Some(42),
    )?;

    let k = grid.nearest_z(0.5);
    let nm = grid.shape().1;
    let mean_abs_diff: f64 = (0..nm)
        .map(|j| (fast[[k, j]] - mc[[k, j]]).abs())
        .sum::<f64>()
        / nm as f64;
    assert!(
        mean_abs_diff < 0.05,
        "analytic and Monte Carlo surfaces disagree: {mean_abs_diff}"
    );
    Ok(())
}

#[test]
fn mass_definition_conversions_roundtrip() -> Result<()> {
    let converter = MassConverter::new(CosmologyParams::default())?;
    for &z in &[0.0, 0.5, 1.0, 1.5, 2.0] {
        for &m200m in &[1e13, 5e13, 2e14, 1e15, 1e16] {
            let (m500c, r500c) = converter.m200m_to_m500c(m200m, z)?;
            assert!(m500c < m200m);
            assert!(r500c > 0.0);
            let recovered = converter.m500c_to_m200m(m500c, z)?;
            assert_relative_eq!(recovered, m200m, max_relative = 1e-5);
        }
    }
    Ok(())
}

#[test]
fn mass_limits_and_noise_level_maps() -> Result<()> {
    let grid = survey_grid()?;
    let model = survey_model(&grid)?;
    let scaling = ScalingRelation::upp_default();
    let table = NoiseTable::from_bins(vec![
        NoiseBin {
            y0_rms: 1.5e-5,
            area_deg2: 120.0,
        },
        NoiseBin {
            y0_rms: 3e-5,
            area_deg2: 280.0,
        },
    ])?;

    let comp = calc_completeness(
        &table,
        5.0,
        &model,
        &scaling,
        &FilterResponse::unity(),
        None,
        CompletenessMethod::Fast,
        None,
    )?;

    // Limits rise with redshift over the distance-dominated range
    let limits = calc_mass_limit(0.9, &comp, &grid, None)?;
    assert!(limits[1] < *limits.last().unwrap());

    // Re-binned curve keeps finite values only where grid rows exist
    let edges = [0.0, 0.5, 1.0, 3.0, 4.0];
    let binned = calc_mass_limit(0.9, &comp, &grid, Some(&edges))?;
    assert!(binned[0].is_finite());
    assert!(binned[3].is_nan());

    // Per-noise-level map: deeper level reaches lower mass
    let per_level =
        mass_limit_per_noise_level(&table, 5.0, &model, &scaling, &FilterResponse::unity(), 0.5, 0.9)?;
    assert_eq!(per_level.len(), 2);
    assert!(per_level[0].1 < per_level[1].1);
    Ok(())
}

#[test]
fn footprint_summaries_from_store_surfaces() -> Result<()> {
    let grid = survey_grid()?;
    let mut store = SelectionFunctionStore::new(
        vec![
            TileRecord::new(
                "1_0_0",
                single_level_table(2e-5, 300.0)?,
                FilterResponse::unity(),
                None,
            ),
            TileRecord::new(
                "1_0_1",
                single_level_table(4e-5, 100.0)?,
                FilterResponse::unity(),
                None,
            ),
        ],
        5.0,
        ScalingRelation::upp_default(),
        grid.clone(),
        StoreOptions {
            downsample_step: None,
            mass_function_debias: false,
            obs_freq_ghz: 148.0,
        },
    )?;
    store.update(CosmologyParams::default(), None, |_, g| {
        SurveyModel::uniform_counts(g)
    })?;

    let mut collection = FootprintCollection::new();
    let tiles: Vec<FootprintTile> = store
        .tiles()
        .iter()
        .zip(store.tile_surfaces()?)
        .map(|(record, surface)| FootprintTile {
            tile_name: record.name.clone(),
            area_deg2: record.area_deg2,
            surface: surface.clone(),
        })
        .collect();
    collection.insert(selfn::footprint::FULL_SURVEY, tiles.clone());
    // Overlap footprint covering only the deep tile
    collection.insert("overlap", vec![tiles[0].clone()]);

    let summaries = completeness_by_footprint(&collection, &grid, None)?;
    assert_eq!(summaries.len(), 2);
    let full = summaries.iter().find(|s| s.label == "full").unwrap();
    let overlap = summaries.iter().find(|s| s.label == "overlap").unwrap();
    assert!(full.mean_limit.is_finite());
    assert!(overlap.mean_limit.is_finite());
    // Dropping the shallow tile lowers the mean limit
    assert!(overlap.mean_limit <= full.mean_limit + 1e-9);
    Ok(())
}

#[test]
fn catalog_projection_peaks_at_consistent_mass() -> Result<()> {
    let grid = survey_grid()?;
    let mut store = SelectionFunctionStore::new(
        vec![TileRecord::new(
            "1_0_0",
            single_level_table(2e-5, 400.0)?,
            FilterResponse::unity(),
            None,
        )],
        5.0,
        ScalingRelation::upp_default(),
        grid.clone(),
        StoreOptions {
            downsample_step: None,
            mass_function_debias: false,
            obs_freq_ghz: 148.0,
        },
    )?;
    store.update(CosmologyParams::default(), None, |_, g| {
        SurveyModel::uniform_counts(g)
    })?;

    // A detection whose signal was generated from the relation itself
    let model = survey_model(&grid)?;
    let z = 0.5;
    let k = grid.nearest_z(z);
    let j = grid.nearest_log10m(14.5);
    let y0 = model.predict_y0(
        &ScalingRelation::upp_default(),
        &FilterResponse::unity(),
        k,
        j,
    );
    let catalog = vec![CatalogEntry {
        tile: "1_0_0".into(),
        y0,
        y0_err: 0.05 * y0,
        z,
        z_err: 0.0,
    }];

    let density = store.project_catalog_to_mz(&catalog)?;
    assert_relative_eq!(density.sum(), 1.0, epsilon = 1e-6);

    // Posterior mass peaks at the generating cell
    let row = density.row(k);
    let peak = row
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx)
        .unwrap();
    assert_eq!(peak, j);
    Ok(())
}

#[test]
fn noise_tables_roundtrip_through_artifact_cache() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let cache = ArtifactCache::new(dir.path())?;
    let table = NoiseTable::from_bins(vec![
        NoiseBin {
            y0_rms: 2e-5,
            area_deg2: 100.0,
        },
        NoiseBin {
            y0_rms: 3e-5,
            area_deg2: 50.0,
        },
    ])?;

    let key = ArtifactCache::key(&["noise-table", "1_0_0", "step=1e-7"]);
    cache.put(&key, &table)?;
    let loaded: NoiseTable = cache.get(&key)?.unwrap();
    assert_eq!(loaded, table);

    // A hit must not invoke the compute closure
    let reloaded: NoiseTable = cache.get_or_compute(&key, || {
        panic!("cache miss on a stored key");
    })?;
    assert_eq!(reloaded, table);
    Ok(())
}
