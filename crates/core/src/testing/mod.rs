//! Testing utilities and mock implementations.
//!
//! Mock implementations of the external service traits let the pipeline be
//! exercised end-to-end without indexers, arrs, or a torrent client. All
//! mocks share state across clones so tests keep an inspection handle.

mod mock_fetcher;
mod mock_search_provider;
mod mock_torrent_client;

pub use mock_fetcher::MockFetcher;
pub use mock_search_provider::MockSearchProvider;
pub use mock_torrent_client::MockTorrentClient;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use crate::metainfo::bencode::{self, Value};
    use crate::metainfo::FileEntry;
    use crate::searchee::{Searchee, SearcheeOrigin};
    use crate::torznab::Candidate;

    /// Build a syntactically valid `.torrent` file. A single entry whose
    /// path equals `name` produces a single-file layout.
    pub fn build_torrent(name: &str, files: &[(&str, u64)]) -> Vec<u8> {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), Value::Bytes(name.as_bytes().to_vec()));
        info.insert(b"piece length".to_vec(), Value::Int(16384));
        info.insert(b"pieces".to_vec(), Value::Bytes(vec![0u8; 20]));
        if files.len() == 1 && files[0].0 == name {
            info.insert(b"length".to_vec(), Value::Int(files[0].1 as i64));
        } else {
            let list = files
                .iter()
                .map(|(path, size)| {
                    let mut entry = BTreeMap::new();
                    entry.insert(b"length".to_vec(), Value::Int(*size as i64));
                    entry.insert(
                        b"path".to_vec(),
                        Value::List(
                            path.split('/')
                                .map(|p| Value::Bytes(p.as_bytes().to_vec()))
                                .collect(),
                        ),
                    );
                    Value::Dict(entry)
                })
                .collect();
            info.insert(b"files".to_vec(), Value::List(list));
        }

        let mut root = BTreeMap::new();
        root.insert(
            b"announce".to_vec(),
            Value::Bytes(b"https://tracker.example/announce".to_vec()),
        );
        root.insert(b"info".to_vec(), Value::Dict(info));
        bencode::to_bytes(&Value::Dict(root))
    }

    /// A data-dir searchee with the given relative files.
    pub fn build_searchee(name: &str, files: &[(&str, u64)]) -> Searchee {
        let files = files
            .iter()
            .map(|(path, size)| FileEntry::new(*path, *size))
            .collect();
        Searchee::new(name, files, None, SearcheeOrigin::DataDir)
    }

    /// A candidate with reasonable defaults.
    pub fn candidate(indexer_id: &str, guid: &str, name: &str, size: u64) -> Candidate {
        Candidate {
            indexer_id: indexer_id.to_string(),
            guid: guid.to_string(),
            name: name.to_string(),
            size,
            link: format!("https://{indexer_id}.example/dl/{guid}.torrent"),
            pub_date: None,
            info_hash_hint: None,
        }
    }
}
