//! Built-in reference dataset
//!
//! Small pathways exercising every process variant with values that can be
//! checked by hand. Used by `load-sample` and by the integration tests.

use crate::error::Result;
use crate::models::Dataset;

const SAMPLE: &str = include_str!("../data/sample.toml");

pub fn dataset() -> Result<Dataset> {
    Ok(toml::from_str(SAMPLE)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::database::Database;

    #[test]
    fn test_sample_builds_a_database() {
        let data = dataset().unwrap();
        let counts = data.counts();
        assert_eq!(counts.gases, 1);
        assert_eq!(counts.resources, 2);
        assert_eq!(counts.mixes, 4);
        assert_eq!(counts.vehicles, 1);

        let db = Database::new(data, &Settings::default()).unwrap();
        assert!(db.target_by_name("Truck Transportation Test").is_ok());
        assert!(db.target_by_name("Test Mix of Mixes").is_ok());
        assert!(db.target_by_name("Test Vehicle").is_ok());
    }
}
