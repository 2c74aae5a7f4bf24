//! Scene backend seam.
//!
//! The live indicator is a source in a streaming tool's scene collection.
//! The relay only needs two things from that tool: the list of scenes with
//! their sources, and a way to toggle one source's visibility.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

/// Boxed future for backend results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A scene and the names of the sources it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub name: String,
    pub sources: Vec<String>,
}

/// A (scene, source) pair the indicator toggles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToggleTarget {
    pub scene: String,
    pub source: String,
}

/// Scene enumeration and visibility control.
pub trait SceneBackend: Send + Sync + 'static {
    /// Enumerate scenes.
    fn list_scenes(&self) -> BoxFuture<'_, Result<Vec<SceneInfo>>>;

    /// Show or hide `source` in `scene`.
    fn set_source_visible<'a>(
        &'a self,
        scene: &'a str,
        source: &'a str,
        visible: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Every (scene, source) pair whose source is named `source_name`.
pub fn matching_targets(scenes: &[SceneInfo], source_name: &str) -> Vec<ToggleTarget> {
    scenes
        .iter()
        .flat_map(|scene| {
            scene
                .sources
                .iter()
                .filter(|source| source.as_str() == source_name)
                .map(|source| ToggleTarget {
                    scene: scene.name.clone(),
                    source: source.clone(),
                })
        })
        .collect()
}

/// Backend with one implicit scene that only logs toggles.
///
/// Used when no streaming tool is attached.
#[derive(Debug, Clone)]
pub struct LogOnlyBackend {
    source_name: String,
}

impl LogOnlyBackend {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

impl SceneBackend for LogOnlyBackend {
    fn list_scenes(&self) -> BoxFuture<'_, Result<Vec<SceneInfo>>> {
        let scenes = vec![SceneInfo {
            name: "log".to_string(),
            sources: vec![self.source_name.clone()],
        }];
        Box::pin(async move { Ok(scenes) })
    }

    fn set_source_visible<'a>(
        &'a self,
        scene: &'a str,
        source: &'a str,
        visible: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tracing::info!("{} / {} -> {}", scene, source, if visible { "live" } else { "idle" });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(name: &str, sources: &[&str]) -> SceneInfo {
        SceneInfo {
            name: name.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_matching_targets_filters_by_source() {
        let scenes = vec![
            scene("Game", &["camera", "slp-live"]),
            scene("Break", &["music"]),
            scene("Bracket", &["slp-live", "bracket"]),
        ];

        let targets = matching_targets(&scenes, "slp-live");

        assert_eq!(
            targets,
            vec![
                ToggleTarget {
                    scene: "Game".to_string(),
                    source: "slp-live".to_string()
                },
                ToggleTarget {
                    scene: "Bracket".to_string(),
                    source: "slp-live".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_matching_targets_none() {
        let scenes = vec![scene("Game", &["camera"])];
        assert!(matching_targets(&scenes, "slp-live").is_empty());
    }

    #[tokio::test]
    async fn test_log_only_backend_lists_its_source() {
        let backend = LogOnlyBackend::new("slp-live");
        let scenes = backend.list_scenes().await.unwrap();

        assert_eq!(matching_targets(&scenes, "slp-live").len(), 1);
        assert!(backend.set_source_visible("log", "slp-live", true).await.is_ok());
    }
}
