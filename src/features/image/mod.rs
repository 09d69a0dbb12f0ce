//! 卡片渲染与导出。
//!
//! `renderer` 生成卡片节点树，`snapshot` 内联样式与图片，`markup` / `layout`
//! 组合矢量文档，`raster` 栅格化为 PNG，`export` 串联整个流程。

pub mod export;
pub mod fetch;
pub mod fonts;
pub mod layout;
pub mod markup;
pub mod raster;
pub mod renderer;
pub mod snapshot;
pub mod style;
pub mod view;

pub use export::{CardExporter, ExportOptions, ExportedImage};
pub use fetch::{AssetFetcher, FetchError, FetchedImage, ImageFetcher};
pub use layout::PrimitiveComposer;
pub use markup::{ForeignObjectComposer, SvgComposer};
pub use renderer::{CardInput, CardSize, RenderableCard, RenderedCard, render_card};
pub use snapshot::Snapshot;
