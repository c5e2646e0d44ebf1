//! Mirror Confluence spaces into a static HTML site: one file per page, a
//! searchable `index.html` and a permissive `robots.txt`.

pub mod client;
pub mod config;
pub mod export;
pub mod fetch;
pub mod index;
pub mod render;

#[cfg(test)]
pub(crate) mod test_support;
