use rand::Rng;

/// Fingerprint configuration for a browser session
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl FingerprintConfig {
    /// Pick a common desktop user agent at random, keeping the given viewport
    pub fn randomized(viewport_width: u32, viewport_height: u32) -> Self {
        let mut rng = rand::thread_rng();

        let user_agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        ];

        // Small jitter so concurrent workers do not share an exact window size
        let width = viewport_width.saturating_sub(rng.gen_range(0..=32));
        let height = viewport_height.saturating_sub(rng.gen_range(0..=24));

        Self {
            user_agent: user_agents[rng.gen_range(0..user_agents.len())].to_string(),
            viewport_width: width.max(800),
            viewport_height: height.max(600),
        }
    }
}
