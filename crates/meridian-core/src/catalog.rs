use crate::types::Asset;

/// (ticker, asset class, region, display name)
const DEFAULT_UNIVERSE: [(&str, &str, &str, &str); 8] = [
    ("SXR8.DE", "us_large_cap", "us", "US Large Cap (iShares S&P 500)"),
    ("ZPRR.DE", "us_small_cap", "us", "US Small Cap (Russell 2000)"),
    ("EXSA.DE", "europe_equity", "europe", "Europe (iShares Stoxx 600)"),
    ("IS3N.DE", "emerging_markets_equity", "emerging", "Emerging Markets (iShares MSCI EM IMI)"),
    ("SXRP.DE", "euro_government_bonds", "europe", "Euro Govt Bonds (iShares Euro Govt 3-7yr)"),
    ("XHYG.DE", "euro_high_yield", "europe", "Euro High Yield (iShares Euro High Yield)"),
    ("IWDP.AS", "global_reits", "global", "Global REIT (iShares Developed Markets Property Yield)"),
    ("4GLD.DE", "gold", "global", "Gold (Xetra-Gold)"),
];

/// Eight-ETF multi-asset universe whose classes match
/// `ConsensusTable::long_term_defaults`.
pub fn default_universe() -> Vec<Asset> {
    DEFAULT_UNIVERSE
        .iter()
        .map(|(ticker, class, region, name)| Asset {
            name: Some(name.to_string()),
            ..Asset::new(ticker, class, region)
        })
        .collect()
}
