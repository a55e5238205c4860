//! Provider catalog: default regions and instance size selection.
//!
//! The engine asks the catalog two questions about a provider: where to put
//! a machine whose policy named no region, and which size is the cheapest one
//! that satisfies a machine's RAM/CPU bounds under the price ceiling.

use tracing::debug;

use crate::policy::Range;
use crate::types::Provider;

/// Static facts about one instance size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeInfo {
    pub name: &'static str,
    /// Memory in GiB.
    pub ram: f64,
    pub cpu: u32,
    /// Hourly on-demand price in USD.
    pub price: f64,
}

const fn size(name: &'static str, ram: f64, cpu: u32, price: f64) -> SizeInfo {
    SizeInfo { name, ram, cpu, price }
}

const AMAZON_SIZES: &[SizeInfo] = &[
    size("t2.nano", 0.5, 1, 0.0065),
    size("t2.micro", 1.0, 1, 0.013),
    size("t2.small", 2.0, 1, 0.026),
    size("t2.medium", 4.0, 2, 0.052),
    size("c4.large", 3.75, 2, 0.105),
    size("m4.large", 8.0, 2, 0.12),
    size("c4.xlarge", 7.5, 4, 0.209),
    size("m4.xlarge", 16.0, 4, 0.239),
    size("m4.2xlarge", 32.0, 8, 0.479),
];

const DIGITALOCEAN_SIZES: &[SizeInfo] = &[
    size("512mb", 0.5, 1, 0.007),
    size("1gb", 1.0, 1, 0.015),
    size("2gb", 2.0, 2, 0.03),
    size("4gb", 4.0, 2, 0.06),
    size("8gb", 8.0, 4, 0.119),
    size("16gb", 16.0, 8, 0.238),
];

const GOOGLE_SIZES: &[SizeInfo] = &[
    size("f1-micro", 0.6, 1, 0.007),
    size("g1-small", 1.7, 1, 0.021),
    size("n1-standard-1", 3.75, 1, 0.035),
    size("n1-standard-2", 7.5, 2, 0.07),
    size("n1-highmem-2", 13.0, 2, 0.088),
    size("n1-standard-4", 15.0, 4, 0.14),
];

/// Lookup service the engine consults for provider-specific defaults.
pub trait ProviderCatalog: Send + Sync {
    /// Region assigned to machines whose policy leaves it unspecified.
    fn default_region(&self, provider: Provider) -> String;

    /// Cheapest size satisfying `ram` (GiB) and `cpu` under `max_price`
    /// (zero = no ceiling), or `None` if nothing qualifies.
    fn choose_size(&self, provider: Provider, ram: Range, cpu: Range, max_price: f64)
        -> Option<String>;
}

/// Built-in catalog with fixed size tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCatalog;

impl StaticCatalog {
    pub fn sizes(provider: Provider) -> &'static [SizeInfo] {
        match provider {
            Provider::Amazon => AMAZON_SIZES,
            Provider::DigitalOcean => DIGITALOCEAN_SIZES,
            Provider::Google => GOOGLE_SIZES,
            Provider::Vagrant => &[],
        }
    }
}

impl ProviderCatalog for StaticCatalog {
    fn default_region(&self, provider: Provider) -> String {
        match provider {
            Provider::Amazon => "us-west-1",
            Provider::DigitalOcean => "nyc1",
            Provider::Google => "us-east1-b",
            Provider::Vagrant => "",
        }
        .to_string()
    }

    fn choose_size(
        &self,
        provider: Provider,
        ram: Range,
        cpu: Range,
        max_price: f64,
    ) -> Option<String> {
        // Local VMs have no size table; the size string carries the
        // requested RAM and CPU directly.
        if provider == Provider::Vagrant {
            let ram_gb = if ram.min > 0.0 { ram.min } else { 1.0 };
            let cpus = if cpu.min > 0.0 { cpu.min } else { 1.0 };
            return Some(format!("{ram_gb},{cpus}"));
        }

        let chosen = Self::sizes(provider)
            .iter()
            .filter(|s| ram.accepts(s.ram) && cpu.accepts(f64::from(s.cpu)))
            .filter(|s| max_price == 0.0 || s.price <= max_price)
            .min_by(|a, b| a.price.total_cmp(&b.price))?;

        debug!(%provider, size = chosen.name, price = chosen.price, "size chosen");
        Some(chosen.name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_cheapest_qualifying_size() {
        let size = StaticCatalog.choose_size(
            Provider::Amazon,
            Range::new(4.0, 0.0),
            Range::new(2.0, 0.0),
            0.0,
        );
        assert_eq!(size.as_deref(), Some("t2.medium"));
    }

    #[test]
    fn respects_price_ceiling() {
        let size = StaticCatalog.choose_size(
            Provider::Amazon,
            Range::new(16.0, 0.0),
            Range::default(),
            0.1,
        );
        assert_eq!(size, None);

        let size = StaticCatalog.choose_size(
            Provider::Amazon,
            Range::new(16.0, 0.0),
            Range::default(),
            0.3,
        );
        assert_eq!(size.as_deref(), Some("m4.xlarge"));
    }

    #[test]
    fn respects_upper_bounds() {
        let size = StaticCatalog.choose_size(
            Provider::Google,
            Range::new(7.0, 8.0),
            Range::new(2.0, 2.0),
            0.0,
        );
        assert_eq!(size.as_deref(), Some("n1-standard-2"));
    }

    #[test]
    fn vagrant_size_encodes_request() {
        let size = StaticCatalog.choose_size(
            Provider::Vagrant,
            Range::new(2.0, 0.0),
            Range::default(),
            0.0,
        );
        assert_eq!(size.as_deref(), Some("2,1"));
    }

    #[test]
    fn every_provider_has_a_default_region_except_vagrant() {
        for provider in Provider::ALL {
            let region = StaticCatalog.default_region(provider);
            assert_eq!(region.is_empty(), provider == Provider::Vagrant);
        }
    }
}
