//! `WebAppExt` for `iptvserver::Server`

use iptvserver::Server;
use rust_embed::RustEmbed;

use crate::WebAppExt;

#[async_trait::async_trait]
impl WebAppExt for Server {
    async fn add_webapp<W>(&mut self, path: &str)
    where
        W: RustEmbed + Clone + Send + Sync + 'static,
    {
        self.add_spa::<W>(&normalize_mount_path(path)).await;
    }

    async fn add_webapp_with_redirect<W>(&mut self, path: &str)
    where
        W: RustEmbed + Clone + Send + Sync + 'static,
    {
        let mount_path = normalize_mount_path(path);
        self.add_spa::<W>(&mount_path).await;

        if mount_path != "/" {
            self.add_redirect("/", &format!("{mount_path}/")).await;
        }
    }
}

/// `"app"`, `"/app/"` and `" /app "` all become `"/app"`; empty becomes `"/"`
fn normalize_mount_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
