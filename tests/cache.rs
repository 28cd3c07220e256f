use camino::Utf8PathBuf;

use tempo_no2::cache::{CacheKey, QueryCache};
use tempo_no2::domain::{Observation, Query};

fn temp_cache() -> (tempfile::TempDir, QueryCache) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data_cache")).unwrap();
    (temp, QueryCache::new(root))
}

fn sample_observations() -> Vec<Observation> {
    vec![
        Observation {
            latitude: 29.01,
            longitude: -95.99,
            no2_total_column: 5.512345678901234e15,
        },
        Observation {
            latitude: 31.123456789,
            longitude: -92.000001,
            no2_total_column: 0.1 + 0.2,
        },
    ]
}

#[test]
fn put_then_get_round_trips() {
    let (_temp, cache) = temp_cache();
    let query = Query::new("Houston", "2024-01-01", "2024-01-01");
    let observations = sample_observations();

    assert!(cache.get(&query).is_none());
    cache.put(&query, &observations).unwrap();

    assert_eq!(cache.get(&query), Some(observations));
}

#[test]
fn empty_result_is_cached() {
    let (_temp, cache) = temp_cache();
    let query = Query::new("Houston", "2024-01-01", "2024-01-01");
    cache.put(&query, &[]).unwrap();
    assert_eq!(cache.get(&query), Some(Vec::new()));
}

#[test]
fn key_ignores_case_and_punctuation() {
    let upper = CacheKey::for_query(&Query::new("New York", "2024-01-01", "2024-01-02"));
    let lower = CacheKey::for_query(&Query::new("new york", "2024-01-01", "2024-01-02"));
    assert_eq!(upper, lower);
    assert_eq!(upper.as_str(), "newyork_2024-01-01_2024-01-02");

    let st_louis = CacheKey::for_query(&Query::new("St. Louis", "2024-01-01", "2024-01-02"));
    assert_eq!(st_louis.as_str(), "stlouis_2024-01-01_2024-01-02");

    let other_dates = CacheKey::for_query(&Query::new("New York", "2024-01-01", "2024-01-03"));
    assert_ne!(upper, other_dates);
}

#[test]
fn equivalent_place_names_share_an_entry() {
    let (_temp, cache) = temp_cache();
    let observations = sample_observations();
    cache
        .put(&Query::new("St. Louis", "2024-03-01", "2024-03-02"), &observations)
        .unwrap();
    assert_eq!(
        cache.get(&Query::new("st louis", "2024-03-01", "2024-03-02")),
        Some(observations)
    );
}

#[test]
fn corrupt_entry_is_a_miss() {
    let (_temp, cache) = temp_cache();
    let query = Query::new("Houston", "2024-01-01", "2024-01-01");
    let path = cache.entry_path(&CacheKey::for_query(&query));
    std::fs::create_dir_all(cache.root().as_std_path()).unwrap();
    std::fs::write(path.as_std_path(), b"[{\"latitude\": 1.0,").unwrap();

    assert!(cache.get(&query).is_none());
}

#[test]
fn put_leaves_only_the_entry_file() {
    let (_temp, cache) = temp_cache();
    let query = Query::new("Houston", "2024-01-01", "2024-01-01");
    cache.put(&query, &sample_observations()).unwrap();
    cache.put(&query, &sample_observations()[..1]).unwrap();

    let names = std::fs::read_dir(cache.root().as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["houston_2024-01-01_2024-01-01.json".to_string()]);
    assert_eq!(cache.get(&query).unwrap().len(), 1);
}

#[test]
fn entry_file_uses_observation_field_names() {
    let (_temp, cache) = temp_cache();
    let query = Query::new("Houston", "2024-01-01", "2024-01-01");
    cache.put(&query, &sample_observations()).unwrap();

    let raw = std::fs::read_to_string(cache.entry_path(&CacheKey::for_query(&query))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let first = &value.as_array().unwrap()[0];
    assert_eq!(first["latitude"], serde_json::json!(29.01));
    assert_eq!(first["longitude"], serde_json::json!(-95.99));
    assert!(first["no2_total_column"].is_f64());
}

#[test]
fn entries_and_clear() {
    let (_temp, cache) = temp_cache();
    assert!(cache.entries().unwrap().is_empty());
    assert_eq!(cache.clear().unwrap(), 0);

    cache
        .put(&Query::new("Paris", "2024-05-01", "2024-05-02"), &sample_observations())
        .unwrap();
    cache
        .put(&Query::new("Houston", "2024-01-01", "2024-01-01"), &[])
        .unwrap();

    let entries = cache.entries().unwrap();
    let keys = entries.iter().map(|e| e.key.as_str()).collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec!["houston_2024-01-01_2024-01-01", "paris_2024-05-01_2024-05-02"]
    );
    assert_eq!(entries[1].observations, 2);

    assert_eq!(cache.clear().unwrap(), 2);
    assert!(cache.entries().unwrap().is_empty());
}

#[test]
fn clear_leaves_unrelated_files_alone() {
    let (_temp, cache) = temp_cache();
    let root = cache.root().as_std_path().to_path_buf();
    std::fs::create_dir_all(root.join("nested")).unwrap();
    std::fs::write(root.join("notes.txt"), b"keep me").unwrap();
    std::fs::write(root.join("package.json"), b"{}").unwrap();
    std::fs::write(root.join("nested").join("paris_2024-05-01_2024-05-02.json"), b"[]").unwrap();
    std::fs::write(root.join(".tempo-cacheAbC123.tmp"), b"[{\"lat").unwrap();
    cache
        .put(&Query::new("Paris", "2024-05-01", "2024-05-02"), &sample_observations())
        .unwrap();

    assert_eq!(cache.clear().unwrap(), 2);

    let mut remaining = std::fs::read_dir(&root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    remaining.sort();
    assert_eq!(remaining, vec!["nested", "notes.txt", "package.json"]);
    assert!(root.join("nested").join("paris_2024-05-01_2024-05-02.json").exists());
}
