pub mod error;

pub mod config;

pub mod logging;
pub use logging::Logger;

pub mod plugins;

pub mod fs {
    pub mod attributes;
    pub use attributes::{FileAttributes, Request, RequestType, attributes_to_request};

    pub mod decode;
    pub use decode::{DecodedImage, ThumbnailDecoder};

    pub mod local;
    pub use local::LocalProvider;

    pub mod provider;
    pub use provider::{EntryInfo, FileKind, FilesystemInfo, FsProvider, MountInfo};

    #[cfg(test)]
    pub mod sim;
}

pub mod model {
    pub mod directory;
    pub use directory::Directory;

    pub mod file_entry;
    pub use file_entry::{DeepCountStatus, DeepCounts, FileEntry, FileSnapshot};

    pub mod monitor;
    pub use monitor::{CallbackHandle, ClientId, DirectoryEvent, ReadyPayload};

    pub mod registry;
    pub use registry::DirectoryRegistry;
}

pub mod sched {
    pub mod admission;
    pub use admission::{AdmissionController, MAX_ASYNC_JOBS};

    pub(crate) mod driver;
    pub(crate) mod fetch;
    pub(crate) mod fetchers;
    pub(crate) mod queues;
}

pub use error::{CoreError, CoreResult};

pub use config::{Settings, SettingsData};

pub use model::{directory::Directory, registry::DirectoryRegistry};
