use std::fmt::Debug;
use std::marker::PhantomData;

use config::builder::DefaultState;
use config::{File, FileFormat, Source};
use serde::de::DeserializeOwned;

pub mod core_config;
pub mod duration;

/// A settings tree with bundled TOML defaults.
pub trait Config: Debug + Clone + Send + Sync + DeserializeOwned + 'static {
    fn reference() -> &'static str;

    fn builder() -> ConfigBuilder<Self> {
        ConfigBuilder::new()
    }

    fn load() -> crate::Result<Self> {
        Self::builder().build()
    }
}

/// Layers user sources on top of [`Config::reference`]; later sources win.
#[derive(Debug)]
pub struct ConfigBuilder<C> {
    builder: config::ConfigBuilder<DefaultState>,
    _phantom: PhantomData<C>,
}

impl<C> ConfigBuilder<C>
where
    C: Config,
{
    pub fn new() -> Self {
        let builder = config::Config::builder()
            .add_source(File::from_str(C::reference(), FileFormat::Toml));
        Self {
            builder,
            _phantom: PhantomData,
        }
    }

    pub fn add_source<T>(self, source: T) -> Self
    where
        T: Source + Send + Sync + 'static,
    {
        Self {
            builder: self.builder.add_source(source),
            _phantom: PhantomData,
        }
    }

    pub fn add_toml(self, toml: &str) -> Self {
        self.add_source(File::from_str(toml, FileFormat::Toml))
    }

    pub fn build(self) -> crate::Result<C> {
        let config = self.builder.build()?.try_deserialize::<C>()?;
        Ok(config)
    }
}

impl<C> Default for ConfigBuilder<C>
where
    C: Config,
{
    fn default() -> Self {
        Self::new()
    }
}
