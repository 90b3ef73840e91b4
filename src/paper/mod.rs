pub mod bands;
pub mod chapters;
pub mod document;
pub mod editor;
pub mod error;
pub mod events;
pub mod images;
pub mod instruction;
pub mod interpreter;
pub mod model;
pub mod raster;
pub mod redraw;
pub mod scale;
pub mod scanner;
pub mod session;
pub mod surface;
pub mod transport;

pub use bands::{Band, BandStore};
pub use chapters::{Chapter, DocumentModel};
pub use document::{DocumentOptions, ServerDocument};
pub use editor::{OverlayAdapter, OverlayHost, WidgetRegistry};
pub use error::DecodeError;
pub use events::{ContextMenuEvent, DocumentEvent, Viewport};
pub use images::{HttpImageLoader, ImageLoader, NoImages};
pub use instruction::{Decoder, Instruction};
pub use raster::RasterSurface;
pub use scale::{Density, ScaleContext};
pub use session::{DocumentSession, SessionError};
pub use surface::{DrawCall, RecordingSurface, Surface};
pub use transport::Transport;
