//! A small player-like option tree.

use std::sync::Arc;

use optstore_core::{
    ConfigCache, ConfigShadow, GroupSchema, GroupTree, Opt, OptionValue, StoreResult,
};

/// Change flag of the `video` group.
pub const VIDEO_CHANGED: u64 = 0x2;
/// Change flag of the `video-gamma` option.
pub const GAMMA_CHANGED: u64 = 0x1;
/// Change flag of the `scale` group.
pub const SCALE_CHANGED: u64 = 0x4;

/// Option tree used across integration tests.
///
/// ```text
/// player            pause
/// ├── video         video-gamma
/// │   └── scale     video-scale-filter
/// ├── audio         audio-volume, audio-mute
/// └── af[lavfi]     graph
/// ```
#[derive(Debug)]
pub struct PlayerFixture {
    /// The shared store.
    pub shadow: Arc<ConfigShadow>,
    /// Root group schema.
    pub player: Arc<GroupSchema>,
    /// `video` group schema.
    pub video: Arc<GroupSchema>,
    /// `video-scale` group schema.
    pub scale: Arc<GroupSchema>,
    /// `audio` group schema.
    pub audio: Arc<GroupSchema>,
    /// Object list entry schema.
    pub lavfi: Arc<GroupSchema>,
    /// `pause`
    pub pause: Opt<bool>,
    /// `video-gamma`
    pub gamma: Opt<f64>,
    /// `video-scale-filter`
    pub scale_filter: Opt<String>,
    /// `audio-volume`
    pub volume: Opt<i64>,
    /// `audio-mute`
    pub mute: Opt<bool>,
    /// `graph`
    pub graph: Opt<String>,
}

impl PlayerFixture {
    /// Build the tree and a shadow holding its defaults.
    ///
    /// # Panics
    ///
    /// Panics if the shadow cannot allocate its storage.
    #[must_use]
    pub fn new() -> Self {
        let scale = GroupSchema::builder("scale")
            .option("filter", String::from("bilinear"))
            .change_flags(SCALE_CHANGED)
            .build();
        let video = GroupSchema::builder("video")
            .option_with_flags("gamma", 1.0_f64, GAMMA_CHANGED)
            .sub_group("scale", Arc::clone(&scale))
            .change_flags(VIDEO_CHANGED)
            .build();
        let audio = GroupSchema::builder("audio")
            .option("volume", 100_i64)
            .option("mute", false)
            .build();
        let lavfi = GroupSchema::builder("lavfi")
            .option("graph", String::new())
            .build();
        let player = GroupSchema::builder("player")
            .option("pause", false)
            .sub_group("video", Arc::clone(&video))
            .sub_group("audio", Arc::clone(&audio))
            .object_list("af", vec![Arc::clone(&lavfi)])
            .build();

        let tree = GroupTree::build(Arc::clone(&player));
        Self {
            pause: opt(&tree, &player, "pause"),
            gamma: opt(&tree, &video, "gamma"),
            scale_filter: opt(&tree, &scale, "filter"),
            volume: opt(&tree, &audio, "volume"),
            mute: opt(&tree, &audio, "mute"),
            graph: opt(&tree, &lavfi, "graph"),
            shadow: ConfigShadow::new(tree).expect("fixture shadow allocation"),
            player,
            video,
            scale,
            audio,
            lavfi,
        }
    }

    /// A cache covering the whole tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot allocate its copy.
    pub fn root_cache(&self) -> StoreResult<ConfigCache> {
        ConfigCache::new(&self.shadow, 0)
    }

    /// A cache covering the subtree built from `schema`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot allocate its copy.
    pub fn cache_for(&self, schema: &Arc<GroupSchema>) -> StoreResult<ConfigCache> {
        ConfigCache::for_schema(&self.shadow, schema)
    }
}

impl Default for PlayerFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn opt<T: OptionValue>(tree: &GroupTree, schema: &Arc<GroupSchema>, name: &str) -> Opt<T> {
    tree.opt(schema, name)
        .unwrap_or_else(|| panic!("fixture group '{}' lacks option '{name}'", schema.name()))
}
