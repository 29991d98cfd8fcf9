//! Copy-down-if-absent inheritance across http -> server -> location.
//!
//! Error pages are the one merged slot: parent entries fill in around the
//! child's, the child winning on conflicting status codes.

use std::collections::BTreeMap;

use crate::config::Config;

pub fn apply(config: &mut Config) {
    let http_body_size = config.http.body_size;
    let http_root = config.http.root.clone();
    let http_index = config.http.index.clone();
    let http_error_pages = config.http.error_pages.clone();

    for server in &mut config.http.servers {
        inherit(&mut server.body_size, &http_body_size);
        inherit(&mut server.root, &http_root);
        inherit(&mut server.index, &http_index);
        merge_error_pages(&mut server.error_pages, &http_error_pages);

        for location in &mut server.locations {
            inherit(&mut location.body_size, &server.body_size);
            inherit(&mut location.index, &server.index);
            inherit(&mut location.autoindex, &server.autoindex);
            // alias takes the root's place when set; don't inherit over it
            if location.alias.is_none() {
                inherit(&mut location.root, &server.root);
            }
            merge_error_pages(&mut location.error_pages, &server.error_pages);
        }
    }
}

fn inherit<T: Clone>(child: &mut Option<T>, parent: &Option<T>) {
    if child.is_none() {
        *child = parent.clone();
    }
}

fn merge_error_pages(child: &mut BTreeMap<u16, String>, parent: &BTreeMap<u16, String>) {
    for (code, path) in parent {
        child.entry(*code).or_insert_with(|| path.clone());
    }
}
