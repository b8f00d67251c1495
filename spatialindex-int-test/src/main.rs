use spatialindex::{FullSpace, IndexConfig, RTree, SpatialResult, VecStream};
use spatialindex_int_test::test_util::{
    cleanup, create_test_context, random_entries, rect, small_pages,
};

fn main() -> SpatialResult<()> {
    colog::init();
    println!("Starting stress test...");
    let ctx = create_test_context()?;

    let count = 200_000;
    let entries = random_entries(count, 2024);
    let config = IndexConfig::new(2).with_capacity(32);
    let pages = small_pages().with_page_size(8192).with_cache_pages(256);

    let start = std::time::Instant::now();
    let store = spatialindex::DiskStore::create(ctx.file("bulk.idx"), pages)?;
    let mut stream = VecStream::new(entries.clone());
    let bulk = RTree::bulk_load(store, config.clone(), &mut stream)?;
    println!("Bulk loaded {} entries in {:?}", bulk.len(), start.elapsed());

    let start = std::time::Instant::now();
    let store = spatialindex::DiskStore::create(ctx.file("insert.idx"), pages)?;
    let mut tree = RTree::create(store, config)?;
    for entry in &entries {
        tree.insert(entry.clone())?;
    }
    tree.flush()?;
    println!(
        "Inserted {} entries in {:?} (height {})",
        tree.len(),
        start.elapsed(),
        tree.height()
    );

    let start = std::time::Instant::now();
    let mut hits = 0;
    for i in 0..1000 {
        let x = (i % 40) as f64 * 25.0;
        let y = (i / 40) as f64 * 40.0;
        hits += tree.count(&rect(x, y, x + 20.0, y + 20.0))?;
        hits += bulk.count(&rect(x, y, x + 20.0, y + 20.0))?;
    }
    println!("Ran 2000 window queries ({} hits) in {:?}", hits, start.elapsed());

    let start = std::time::Instant::now();
    for entry in entries.iter().step_by(2) {
        tree.delete(entry.id, &entry.region)?;
    }
    tree.flush()?;
    println!(
        "Deleted {} entries in {:?}, {} left",
        count / 2,
        start.elapsed(),
        tree.count(&FullSpace)?
    );
    println!("Tree statistics: {:?}", tree.statistics());
    println!("Store statistics: {:?}", tree.store().stats());

    drop(tree);
    drop(bulk);
    cleanup(ctx)
}
