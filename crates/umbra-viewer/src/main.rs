//! Interactive viewer for the deferred renderer.
//!
//! Keys: `O` toggles SSAO, `B` outlines the morph bounds, `1`..`7` show a
//! single g-buffer channel, `0` goes back to the lit image, `Esc` quits.

mod app;
mod clock;
mod mesh;
mod scene;

use umbra_engine::logging::{init_logging, LoggingConfig};

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());
    app::run(app::ViewerConfig::default())
}
