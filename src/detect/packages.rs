//! OS packages needed to build the declared Python dependencies

use crate::manifest::normalize_name;

/// Always installed: source distributions with C extensions need a compiler
pub const BASE_PACKAGES: &[&str] = &["gcc"];

/// (Python distributions, Debian packages they need at build time)
const NATIVE_REQUIREMENTS: &[(&[&str], &[&str])] = &[
    (&["psycopg2", "psycopg2-binary", "psycopg"], &["libpq-dev"]),
    (&["mysqlclient"], &["default-libmysqlclient-dev", "pkg-config"]),
];

/// Debian packages for a set of Python distribution names, in install order
pub fn system_packages<'a>(dependencies: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<String> = dependencies.into_iter().map(normalize_name).collect();

    let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();
    for (distributions, needed) in NATIVE_REQUIREMENTS {
        if distributions.iter().any(|d| names.iter().any(|n| n == d)) {
            for package in *needed {
                if !packages.iter().any(|p| p == package) {
                    packages.push(package.to_string());
                }
            }
        }
    }
    packages
}
