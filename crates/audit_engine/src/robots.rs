use audit_core::RobotsSummary;
use audit_logging::{audit_debug, audit_warn};
use texting_robots::Robot;
use url::Url;

use crate::fetch::Fetcher;

/// Parsed robots.txt of the crawled site. Without a usable file every URL is allowed.
pub struct RobotsRules {
    robot: Option<Robot>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self { robot: None }
    }

    pub fn parse(user_agent: &str, body: &str) -> Self {
        match Robot::new(user_agent, body.as_bytes()) {
            Ok(robot) => Self { robot: Some(robot) },
            Err(err) => {
                audit_warn!("Ignoring unparsable robots.txt: {}", err);
                Self::allow_all()
            }
        }
    }

    pub fn allowed(&self, url: &str) -> bool {
        self.robot.as_ref().map_or(true, |robot| robot.allowed(url))
    }

    pub fn sitemaps(&self) -> &[String] {
        self.robot
            .as_ref()
            .map(|robot| robot.sitemaps.as_slice())
            .unwrap_or_default()
    }
}

pub fn robots_url(seed: &Url) -> Option<Url> {
    seed.join("/robots.txt").ok()
}

/// Fetches `/robots.txt` of the seed origin. A missing file is not an error.
pub async fn load_robots(
    fetcher: &dyn Fetcher,
    seed: &Url,
    user_agent: &str,
) -> (RobotsRules, RobotsSummary) {
    let Some(url) = robots_url(seed) else {
        return (RobotsRules::allow_all(), RobotsSummary::default());
    };
    let url = url.to_string();
    match fetcher.fetch(&url).await {
        Ok(fetched) => {
            let body = fetched.body.unwrap_or_default();
            let rules = RobotsRules::parse(user_agent, &body);
            let summary = RobotsSummary {
                url: Some(url),
                found: true,
                sitemaps: rules.sitemaps().to_vec(),
            };
            audit_debug!("robots.txt lists {} sitemap(s)", summary.sitemaps.len());
            (rules, summary)
        }
        Err(err) => {
            audit_debug!("No robots.txt at {}: {}", url, err);
            (
                RobotsRules::allow_all(),
                RobotsSummary {
                    url: Some(url),
                    found: false,
                    sitemaps: Vec::new(),
                },
            )
        }
    }
}
