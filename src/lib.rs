pub mod checksum;
pub mod directory;
pub mod header;
pub mod container;
pub mod meta;
pub mod pixel;

pub use container::{ParseWarning, WappError, WappFile};
pub use directory::{Content, Directory, DirectoryKind, Entry};
pub use header::Header;
pub use meta::{AppMeta, AppType, AppVersion, WappMeta};
pub use pixel::{ImageFormat, PixelError, TargetSize};
