use std::collections::HashSet;

use mulhash::{
    CancelToken, HashParameters, MultiplicativeHash, OutputFormat, PrecomputationTable,
    SearchConfig, Searcher, WriterSink,
};

fn reference_hash(initial: u32, multiplier: u32, bytes: &[u8]) -> u32 {
    let mut digest = initial as u64;
    for &b in bytes {
        digest = (digest * multiplier as u64 + b as u64) % (1 << 32);
    }
    digest as u32
}

#[test]
fn test_default_parameters_five_collisions() {
    let hash = MultiplicativeHash::new(HashParameters { initial_value: 5387, multiplier: 31 }).unwrap();
    let config = SearchConfig::new(7, 3, 5).unwrap().with_target(123456789);
    let searcher = Searcher::new(hash, config);

    let mut collisions: Vec<Vec<u8>> = Vec::new();
    let report = searcher.par_run(&mut collisions, &mut ()).unwrap();

    assert_eq!(report.found, 5);
    assert_eq!(report.table_size, 1 << 24);
    assert_eq!(collisions.len(), 5);

    let distinct: HashSet<&Vec<u8>> = collisions.iter().collect();
    assert_eq!(distinct.len(), 5);
    for collision in &collisions {
        assert_eq!(collision.len(), 10);
        assert_eq!(reference_hash(5387, 31, collision), 123456789);
    }
}

#[test]
fn test_hex_output_lines_hash_to_target() {
    let hash = MultiplicativeHash::new(HashParameters { initial_value: 0, multiplier: 0x01000193 }).unwrap();
    let config = SearchConfig::new(4, 2, 3).unwrap().with_target(0xcafe_babe);
    let searcher = Searcher::new(hash, config);

    let mut sink = WriterSink::new(Vec::new(), OutputFormat::Hex);
    searcher.run(&mut sink, &mut ()).unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in lines {
        let bytes = hex::decode(line).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(reference_hash(0, 0x01000193, &bytes), 0xcafe_babe);
    }
}

#[test]
fn test_table_reusable_across_searches() {
    let hash = MultiplicativeHash::new(HashParameters { initial_value: 17, multiplier: 3 }).unwrap();
    let config = SearchConfig::new(5, 2, 2).unwrap().with_target(99).with_threads(2);
    let searcher = Searcher::new(hash, config);
    let table = PrecomputationTable::par_build(&hash, 99, 2, &mut (), &CancelToken::new()).unwrap();

    let mut first: Vec<Vec<u8>> = Vec::new();
    let mut second: Vec<Vec<u8>> = Vec::new();
    searcher.search(&table, &mut first).unwrap();
    searcher.par_search(&table, &mut second).unwrap();

    for collision in first.iter().chain(second.iter()) {
        assert_eq!(hash.forward_hash(collision), 99);
        assert_eq!(reference_hash(17, 3, collision), 99);
    }
}

#[test]
fn test_long_suffixes_capped_at_2_pow_24() {
    let hash = MultiplicativeHash::new(HashParameters { initial_value: 5387, multiplier: 31 }).unwrap();
    for &suffix_size in [4usize, 5].iter() {
        let table =
            PrecomputationTable::par_build(&hash, 99, suffix_size, &mut (), &CancelToken::new()).unwrap();

        assert_eq!(table.table_size(), 1 << 24);
        assert_eq!(table.suffix_size(), suffix_size);
        assert!(table.len() <= 1 << 24);
        for key in table.keys() {
            let index = table.suffix_index(key).unwrap();
            assert!(index < 1 << 24);
            let suffix = table.get(key).unwrap();
            assert_eq!(suffix.len(), suffix_size);
            assert_eq!(suffix[0], 0);
            assert_eq!(hash.backward_partial_hash(&suffix, 99), key);
        }
    }
}
