use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatialindex::{
    Entry, EntryId, FullSpace, IndexConfig, MemoryStore, MovingQuery, MovingRegion, RTree,
    SpatialError, TprTree, VecStream,
};
use spatialindex_int_test::test_util::{cleanup, create_test_context, rect, run_test, sorted};

#[ctor::ctor]
fn init() {
    colog::init();
}

fn tpr_config() -> IndexConfig {
    IndexConfig::new(2)
        .with_capacity(8)
        .with_fill_factor(0.4)
        .with_horizon(10.0)
}

/// Objects scattered over `[0, 100)^2` moving at up to two units per step in
/// each direction, all reported at time 0.
fn moving_objects(count: usize, seed: u64) -> Vec<Entry<MovingRegion>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let x = rng.random_range(0.0..100.0);
            let y = rng.random_range(0.0..100.0);
            let velocity = vec![rng.random_range(-2.0..2.0), rng.random_range(-2.0..2.0)];
            let region = rect(x, y, x + 1.0, y + 1.0);
            let moving = MovingRegion::new(region, velocity, 0.0, 10.0).expect("valid object");
            Entry::new(i as EntryId, moving)
        })
        .collect()
}

fn brute_force(entries: &[Entry<MovingRegion>], query: &MovingQuery) -> Vec<EntryId> {
    let mut ids: Vec<EntryId> = entries
        .iter()
        .filter(|e| {
            query
                .region()
                .intersects_in_interval(&e.region, query.start(), query.end())
                .unwrap_or(false)
        })
        .map(|e| e.id)
        .collect();
    ids.sort();
    ids
}

#[test]
fn test_bound_at_scenario() {
    run_test(
        create_test_context,
        |_ctx| {
            let object = MovingRegion::new(rect(0.0, 0.0, 1.0, 1.0), vec![1.0, 0.0], 0.0, 10.0)?;
            assert_eq!(object.bound_at(5.0), rect(5.0, 0.0, 6.0, 1.0));
            // clipped to the validity interval
            assert_eq!(object.bound_at(50.0), rect(10.0, 0.0, 11.0, 1.0));
            assert_eq!(object.bound_at(-3.0), rect(0.0, 0.0, 1.0, 1.0));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_snapshot_and_window_queries_match_brute_force() {
    run_test(
        create_test_context,
        |_ctx| {
            let objects = moving_objects(1500, 99);
            let mut tree: TprTree<MemoryStore<MovingRegion>> =
                RTree::create(MemoryStore::new(), tpr_config())?;
            for object in &objects {
                tree.insert(object.clone())?;
            }
            tree.validate()?;

            let queries = [
                MovingQuery::snapshot(rect(40.0, 40.0, 60.0, 60.0), 0.0)?,
                MovingQuery::snapshot(rect(40.0, 40.0, 60.0, 60.0), 7.5)?,
                MovingQuery::window(rect(0.0, 0.0, 10.0, 100.0), 2.0, 6.0)?,
                MovingQuery::window(rect(-30.0, -30.0, -10.0, -10.0), 0.0, 10.0)?,
                MovingQuery::snapshot(rect(40.0, 40.0, 60.0, 60.0), 25.0)?,
            ];
            for query in &queries {
                assert_eq!(sorted(tree.ids(query)?), brute_force(&objects, query));
            }
            // past the horizon nothing is valid any more
            assert_eq!(tree.count(&queries[4])?, 0);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_moving_query_region() {
    run_test(
        create_test_context,
        |_ctx| {
            let objects = moving_objects(800, 5);
            let mut tree: TprTree<MemoryStore<MovingRegion>> =
                RTree::create(MemoryStore::new(), tpr_config())?;
            for object in &objects {
                tree.insert(object.clone())?;
            }
            // a query region sweeping right at three units per step
            let sweeping = MovingRegion::new(rect(0.0, 20.0, 10.0, 30.0), vec![3.0, 0.0], 0.0, 10.0)?;
            let query = MovingQuery::new(sweeping, 0.0, 10.0)?;
            assert_eq!(sorted(tree.ids(&query)?), brute_force(&objects, &query));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_insert_object_and_delete() {
    run_test(
        create_test_context,
        |_ctx| {
            let mut tree: TprTree<MemoryStore<MovingRegion>> =
                RTree::create(MemoryStore::new(), tpr_config())?;
            for i in 0..50 {
                let x = i as f64 * 3.0;
                tree.insert_object(i, rect(x, 0.0, x + 1.0, 1.0), vec![0.0, 1.0], 0.0)?;
            }
            tree.validate()?;
            assert_eq!(tree.count(&FullSpace)?, 50);

            // objects climb one unit per step: at t = 5 they sit at y in [5, 6]
            let band = MovingQuery::snapshot(rect(-10.0, 5.5, 200.0, 5.6), 5.0)?;
            assert_eq!(tree.count(&band)?, 50);
            let empty_band = MovingQuery::snapshot(rect(-10.0, 0.0, 200.0, 1.0), 8.0)?;
            assert_eq!(tree.count(&empty_band)?, 0);

            let gone = MovingRegion::new(rect(30.0, 0.0, 31.0, 1.0), vec![0.0, 1.0], 0.0, 10.0)?;
            tree.delete(10, &gone)?;
            tree.validate()?;
            assert_eq!(tree.count(&band)?, 49);

            let wrong_velocity =
                MovingRegion::new(rect(33.0, 0.0, 34.0, 1.0), vec![1.0, 1.0], 0.0, 10.0)?;
            assert!(matches!(
                tree.delete(11, &wrong_velocity),
                Err(SpatialError::EntryNotFound(11))
            ));

            assert!(matches!(
                tree.insert_object(99, rect(0.0, 0.0, 1.0, 1.0), vec![f64::NAN, 0.0], 0.0),
                Err(SpatialError::InvalidRegion(_))
            ));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_moving_bulk_load_and_deletes() {
    run_test(
        create_test_context,
        |_ctx| {
            let objects = moving_objects(1000, 3);
            let mut tree: TprTree<MemoryStore<MovingRegion>> = RTree::bulk_load(
                MemoryStore::new(),
                tpr_config(),
                &mut VecStream::new(objects.clone()),
            )?;
            tree.validate()?;

            for object in objects.iter().take(600) {
                tree.delete(object.id, &object.region)?;
            }
            tree.validate()?;
            let query = MovingQuery::window(rect(20.0, 20.0, 80.0, 80.0), 1.0, 3.0)?;
            assert_eq!(sorted(tree.ids(&query)?), brute_force(&objects[600..], &query));
            Ok(())
        },
        cleanup,
    )
}
