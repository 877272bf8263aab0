//! Textual rendering of a pool's layout, built entirely on the public
//! snapshot interface. Run with `cargo run --example visualize`.

use poolalloc::{Pool, PoolResult, SegmentKind};

fn render(pool: &Pool) {
    let stats = pool.stats();

    println!("\nMemory Pool:");
    println!("  total size: {} bytes", stats.total_size);
    println!("  used memory: {} bytes", stats.used_memory);
    println!("  live allocations: {}", stats.num_allocations);
    println!("  layout:");

    for segment in pool.snapshot() {
        match segment.kind {
            SegmentKind::Gap => println!("    [GAP:  {} bytes]", segment.len),
            SegmentKind::Used => println!("    [USED: {} bytes]", segment.len),
        }
    }
}

fn main() -> PoolResult<()> {
    let mut pool = Pool::new(150)?;
    render(&pool);

    let text = pool.alloc(12)?;
    pool.payload_mut(text).unwrap()[..12].copy_from_slice(b"Hello World\0");
    render(&pool);

    let buffer = pool.alloc(20)?;
    pool.payload_mut(buffer).unwrap().fill(b'X');
    render(&pool);

    pool.free(text)?;
    render(&pool);

    let number = pool.alloc(4)?;
    pool.payload_mut(number).unwrap()[..4].copy_from_slice(&0x00EE_FFC0i32.to_le_bytes());

    let empty = pool.alloc(0)?;
    render(&pool);

    if let Err(err) = pool.alloc(1000) {
        println!("\n1000 byte request refused: {err}");
    }

    pool.free(buffer)?;
    pool.free(number)?;
    pool.free(empty)?;
    render(&pool);

    Ok(())
}
