use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tsbucket::{MemoryConnection, TimeSeries};

const MS: u64 = 1_000_000;

#[test]
fn stores_on_separate_connections_share_keyspace() -> anyhow::Result<()> {
    let root = MemoryConnection::new();
    let handles: Vec<_> = (0..4_u64)
        .map(|writer| {
            let conn = root.handle();
            thread::spawn(move || -> tsbucket::Result<()> {
                let ts = TimeSeries::new("shared", Duration::from_millis(100), Duration::ZERO, conn)?;
                for i in 0..250_u64 {
                    // Writers interleave in time so every bucket sees all of them.
                    let at = (i * 4 + writer) * MS;
                    ts.add_at(&(writer, i), at)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread")?;
    }

    let reader = TimeSeries::new("shared", Duration::from_millis(100), Duration::ZERO, root)?;
    let points: Vec<(u64, u64)> = reader.fetch_range_vec(0, 1000 * MS)?;
    assert_eq!(points.len(), 1000);
    for (pos, (writer, i)) in points.iter().enumerate() {
        assert_eq!(i * 4 + writer, pos as u64);
    }
    Ok(())
}

#[test]
fn one_store_shared_across_threads() -> anyhow::Result<()> {
    let ts = Arc::new(TimeSeries::new(
        "dev",
        Duration::from_millis(50),
        Duration::ZERO,
        MemoryConnection::new(),
    )?);

    let writers: Vec<_> = (0..4_u64)
        .map(|writer| {
            let ts = Arc::clone(&ts);
            thread::spawn(move || {
                for i in 0..100_u64 {
                    let at = (writer * 100 + i) * MS;
                    ts.add_at(&at, at).expect("add");
                    if i % 10 == 0 {
                        let seen: Vec<u64> = ts.fetch_range_vec(0, at).expect("range");
                        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let all: Vec<u64> = ts.fetch_range_vec(0, 400 * MS)?;
    assert_eq!(all, (0..400_u64).map(|i| i * MS).collect::<Vec<_>>());
    Ok(())
}
