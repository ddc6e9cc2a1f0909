use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use uuid::Uuid;

use crate::configuration::WebdriverSettings;

const PROFILE_DIR_PREFIX: &str = "meibo-chrome-";

// 偽装を避けるため固定の一般的なデスクトップUAを使う
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) \
Chrome/135.0.0.0 Safari/537.36";

/// One headless Chrome session, scoped to one pipeline run. Owns a unique
/// user-data-dir that is removed together with the session in [`Droid::quit`].
pub struct Droid {
    pub driver: WebDriver,
    profile_dir: PathBuf,
    selector_timeout: Duration,
    page_settle: Duration,
}

impl Droid {
    pub async fn new(settings: &WebdriverSettings) -> anyhow::Result<Self> {
        cleanup_stale_profiles();

        let profile_dir =
            std::env::temp_dir().join(format!("{}{}", PROFILE_DIR_PREFIX, Uuid::new_v4()));

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--headless=new")?;
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg("--disable-gpu")?;
        caps.add_arg("--window-size=1920,1080")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg("--disable-translate")?;
        caps.add_arg("--disable-extensions")?;
        caps.add_arg("--disable-setuid-sandbox")?;
        caps.add_arg("--lang=ja-JP")?;
        caps.add_arg("--accept-lang=ja-JP,ja;q=0.9,en;q=0.8")?;
        caps.add_arg(&format!("--user-data-dir={}", profile_dir.display()))?;
        caps.add_arg(&format!("user-agent={}", USER_AGENT))?;

        let driver = WebDriver::new(&settings.server_url, caps)
            .await
            .with_context(|| {
                format!("failed to reach webdriver at {}", settings.server_url)
            })?;
        driver
            .set_page_load_timeout(Duration::from_secs(settings.page_load_timeout_secs))
            .await?;

        Ok(Droid {
            driver,
            profile_dir,
            selector_timeout: Duration::from_secs(settings.selector_timeout_secs),
            page_settle: Duration::from_secs(settings.page_settle_secs),
        })
    }

    pub async fn navigate(&self, url: &str) -> WebDriverResult<()> {
        self.driver.goto(url).await
    }

    /// Navigates and gives the page its settle time before the source is read.
    pub async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
        self.driver.goto(url).await?;
        tokio::time::sleep(self.page_settle).await;
        Ok(self.driver.source().await?)
    }

    /// Waits up to the configured selector timeout for at least one element
    /// matching `selector`. A timeout is "not found", never an error.
    pub async fn wait_for_selector(&self, selector: &str) -> bool {
        match self
            .driver
            .query(By::Css(selector))
            .wait(self.selector_timeout, Duration::from_millis(250))
            .exists()
            .await
        {
            Ok(found) => found,
            Err(e) => {
                log::debug!("selector {} failed: {}", selector, e);
                false
            }
        }
    }

    pub async fn page_source(&self) -> WebDriverResult<String> {
        self.driver.source().await
    }

    /// Plain-text rendering of the current page body.
    pub async fn body_text(&self) -> WebDriverResult<String> {
        let body = self.driver.find(By::Tag("body")).await?;
        body.text().await
    }

    /// Debug screenshots are best-effort; failure to capture never interrupts
    /// a subject.
    pub async fn screenshot(&self, path: &Path) {
        if let Err(e) = self.driver.screenshot(path).await {
            log::debug!("failed to save screenshot {}: {}", path.display(), e);
        }
    }

    /// Closes the session and removes the profile directory. Called on every
    /// exit path by `main`.
    pub async fn quit(self) {
        if let Err(e) = self.driver.quit().await {
            log::error!("failed to close webdriver session: {}", e);
        }
        if self.profile_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
                log::warn!(
                    "failed to remove profile dir {}: {}",
                    self.profile_dir.display(),
                    e
                );
            }
        }
    }
}

/// Removes profile directories left behind by crashed runs.
fn cleanup_stale_profiles() {
    let tmp = std::env::temp_dir();
    let Ok(entries) = std::fs::read_dir(&tmp) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(PROFILE_DIR_PREFIX) {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                log::debug!("failed to remove stale profile {:?}: {}", name, e);
            } else {
                log::debug!("removed stale profile {:?}", name);
            }
        }
    }
}
