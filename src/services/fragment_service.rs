//! FragmentService — fragment lifecycle on top of a pluggable [`FragmentStore`]:
//! validated creation, metadata/payload persistence, listing, deletion and
//! conversion into alternate representations.

use crate::{
    models::{
        fragment::{Fragment, FragmentError, FragmentInit, FragmentResult},
        types::{Transform, TypeRegistry, base_type},
    },
    services::convert,
    storage::FragmentStore,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`FragmentService::by_user`].
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FragmentList {
    Ids(Vec<String>),
    Expanded(Vec<Fragment>),
}

impl FragmentList {
    pub fn len(&self) -> usize {
        match self {
            FragmentList::Ids(ids) => ids.len(),
            FragmentList::Expanded(fragments) => fragments.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a conversion request. `Unsupported` is a signal, not an error,
/// so the caller picks the response.
#[derive(Debug, PartialEq)]
pub enum Conversion {
    Converted { data: Bytes, mime: String },
    Unsupported,
}

#[derive(Clone)]
pub struct FragmentService {
    store: Arc<dyn FragmentStore>,
    types: Arc<TypeRegistry>,
}

impl FragmentService {
    pub fn new(store: Arc<dyn FragmentStore>, types: Arc<TypeRegistry>) -> Self {
        Self { store, types }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn store(&self) -> &Arc<dyn FragmentStore> {
        &self.store
    }

    /// Build a validated, not yet persisted fragment.
    pub fn build(&self, init: FragmentInit) -> FragmentResult<Fragment> {
        Fragment::new(init, &self.types)
    }

    /// Create a fragment for `owner_id` and store its first payload.
    pub async fn create(
        &self,
        owner_id: &str,
        content_type: &str,
        data: Bytes,
    ) -> FragmentResult<Fragment> {
        let mut fragment = self.build(FragmentInit::new(owner_id, content_type))?;
        self.set_data(&mut fragment, data).await?;
        info!(id = fragment.id(), size = fragment.size(), "created fragment");
        Ok(fragment)
    }

    /// Stamp `updated` and write the metadata record. Repeated calls
    /// overwrite the same record.
    pub async fn save(&self, fragment: &mut Fragment) -> FragmentResult<()> {
        fragment.touch();
        self.store.put_metadata(&fragment.to_record()).await?;
        Ok(())
    }

    /// Load a fragment. Missing and unreadable records both report not found.
    pub async fn by_id(&self, owner_id: &str, id: &str) -> FragmentResult<Fragment> {
        let record = self
            .store
            .get_metadata(owner_id, id)
            .await?
            .ok_or_else(|| FragmentError::NotFound { id: id.to_string() })?;

        Fragment::from_record(record, &self.types).map_err(|err| {
            warn!(id, error = %err, "stored fragment failed validation");
            FragmentError::NotFound { id: id.to_string() }
        })
    }

    /// All of an owner's fragments, as ids or full records, in backend order.
    pub async fn by_user(&self, owner_id: &str, expand: bool) -> FragmentResult<FragmentList> {
        if !expand {
            return Ok(FragmentList::Ids(self.store.list_ids(owner_id).await?));
        }
        let fragments = self
            .store
            .list_metadata(owner_id)
            .await?
            .into_iter()
            .map(|record| Fragment::from_record(record, &self.types))
            .collect::<FragmentResult<Vec<_>>>()?;
        Ok(FragmentList::Expanded(fragments))
    }

    /// Remove metadata and payload as one unit.
    pub async fn delete(&self, owner_id: &str, id: &str) -> FragmentResult<()> {
        if !self.store.delete_fragment(owner_id, id).await? {
            return Err(FragmentError::NotFound { id: id.to_string() });
        }
        info!(id, "deleted fragment");
        Ok(())
    }

    pub async fn get_data(&self, fragment: &Fragment) -> FragmentResult<Bytes> {
        self.store
            .get_data(fragment.owner_id(), fragment.id())
            .await?
            .ok_or_else(|| FragmentError::MissingData {
                id: fragment.id().to_string(),
            })
    }

    /// Replace the payload: size and `updated` are stamped first, then
    /// metadata and bytes are written together.
    pub async fn set_data(&self, fragment: &mut Fragment, data: Bytes) -> FragmentResult<()> {
        fragment.set_size(data.len());
        fragment.touch();
        self.store.put_fragment(&fragment.to_record(), data).await?;
        debug!(id = fragment.id(), size = fragment.size(), "stored fragment data");
        Ok(())
    }

    /// Replace the payload of an existing fragment. The base type of
    /// `content_type` must match the stored one.
    pub async fn update_data(
        &self,
        owner_id: &str,
        id: &str,
        content_type: &str,
        data: Bytes,
    ) -> FragmentResult<Fragment> {
        let mut fragment = self.by_id(owner_id, id).await?;
        if base_type(content_type) != fragment.mime_type() {
            return Err(FragmentError::ImmutableType {
                stored: fragment.content_type().to_string(),
                requested: content_type.to_string(),
            });
        }
        if !self.types.is_supported(content_type) {
            return Err(FragmentError::UnsupportedType(content_type.to_string()));
        }
        self.set_data(&mut fragment, data).await?;
        info!(id, size = fragment.size(), "updated fragment");
        Ok(fragment)
    }

    /// Convert `data` (this fragment's payload) to the type behind `ext`.
    ///
    /// Returns [`Conversion::Unsupported`] when `ext` is unknown or its type
    /// is not in the fragment's `formats`. The stored payload is never touched.
    pub async fn convert_to(
        &self,
        fragment: &Fragment,
        data: Bytes,
        ext: &str,
    ) -> FragmentResult<Conversion> {
        let Some(target) = self.types.mime_for_extension(ext) else {
            return Ok(Conversion::Unsupported);
        };
        let Some(transform) = fragment.family().transform(target) else {
            return Ok(Conversion::Unsupported);
        };
        let mime = target.to_string();

        if mime == fragment.mime_type() {
            return Ok(Conversion::Converted { data, mime });
        }

        let data = match transform {
            Transform::PassThrough => data,
            Transform::MarkdownToHtml => convert::markdown_to_html(&data)?,
            Transform::Raster => convert::transcode_image(data, &mime).await?,
        };
        debug!(id = fragment.id(), from = %fragment.mime_type(), to = %mime, "converted fragment");
        Ok(Conversion::Converted { data, mime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::convert::tests::sample_image, storage::MemoryStore};
    use image::ImageFormat;

    fn service() -> FragmentService {
        FragmentService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TypeRegistry::default()),
        )
    }

    #[tokio::test]
    async fn set_data_updates_size_and_round_trips() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/plain", Bytes::from_static(b"fragment"))
            .await
            .unwrap();
        assert_eq!(fragment.size(), 8);

        let loaded = svc.by_id("owner", fragment.id()).await.unwrap();
        assert_eq!(loaded.size(), 8);
        assert_eq!(&svc.get_data(&loaded).await.unwrap()[..], b"fragment");
    }

    #[tokio::test]
    async fn save_refreshes_updated_only() {
        let svc = service();
        let mut fragment = svc.build(FragmentInit::new("owner", "text/plain")).unwrap();
        let created = fragment.created();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        svc.save(&mut fragment).await.unwrap();
        assert_eq!(fragment.created(), created);
        assert!(fragment.updated() > created);

        let stored = svc.by_id("owner", fragment.id()).await.unwrap();
        assert_eq!(stored.updated(), fragment.updated());
    }

    #[tokio::test]
    async fn fragments_are_scoped_to_owner() {
        let svc = service();
        let fragment = svc
            .create("alice", "text/plain", Bytes::from_static(b"a"))
            .await
            .unwrap();
        assert!(matches!(
            svc.by_id("bob", fragment.id()).await,
            Err(FragmentError::NotFound { .. })
        ));
        assert!(svc.by_user("bob", true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_then_lookup_is_not_found() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/plain", Bytes::from_static(b"x"))
            .await
            .unwrap();
        svc.delete("owner", fragment.id()).await.unwrap();
        assert!(matches!(
            svc.by_id("owner", fragment.id()).await,
            Err(FragmentError::NotFound { .. })
        ));
        assert!(svc.store().get_data("owner", fragment.id()).await.unwrap().is_none());
        assert!(matches!(
            svc.delete("owner", fragment.id()).await,
            Err(FragmentError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn listing_orders_match_between_modes() {
        let svc = service();
        let mut created = Vec::new();
        for body in ["one", "two", "three"] {
            let f = svc
                .create("owner", "text/plain", Bytes::from(body))
                .await
                .unwrap();
            created.push(f.id().to_string());
        }

        let FragmentList::Ids(ids) = svc.by_user("owner", false).await.unwrap() else {
            panic!("expected ids");
        };
        let FragmentList::Expanded(full) = svc.by_user("owner", true).await.unwrap() else {
            panic!("expected fragments");
        };
        assert_eq!(ids, created);
        assert_eq!(
            full.iter().map(|f| f.id().to_string()).collect::<Vec<_>>(),
            created
        );
    }

    #[tokio::test]
    async fn update_rejects_type_change_and_keeps_payload() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/plain", Bytes::from_static(b"original"))
            .await
            .unwrap();

        let err = svc
            .update_data(
                "owner",
                fragment.id(),
                "text/html",
                Bytes::from_static(b"<p>new</p>"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FragmentError::ImmutableType { .. }));

        let stored = svc.by_id("owner", fragment.id()).await.unwrap();
        assert_eq!(&svc.get_data(&stored).await.unwrap()[..], b"original");
    }

    #[tokio::test]
    async fn update_accepts_charset_variant_of_same_base_type() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/plain", Bytes::from_static(b"a"))
            .await
            .unwrap();
        let updated = svc
            .update_data(
                "owner",
                fragment.id(),
                "text/plain; charset=utf-8",
                Bytes::from_static(b"longer"),
            )
            .await
            .unwrap();
        assert_eq!(updated.size(), 6);
        assert_eq!(updated.content_type(), "text/plain");
    }

    #[tokio::test]
    async fn markdown_converts_to_html() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/markdown", Bytes::from_static(b"# fragment"))
            .await
            .unwrap();
        let data = svc.get_data(&fragment).await.unwrap();
        let converted = svc.convert_to(&fragment, data, "html").await.unwrap();
        assert_eq!(
            converted,
            Conversion::Converted {
                data: Bytes::from_static(b"<h1>fragment</h1>\n"),
                mime: "text/html".into(),
            }
        );
    }

    #[tokio::test]
    async fn identity_and_pass_through_keep_bytes() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/markdown", Bytes::from_static(b"# fragment"))
            .await
            .unwrap();
        let data = svc.get_data(&fragment).await.unwrap();

        let same = svc.convert_to(&fragment, data.clone(), ".md").await.unwrap();
        assert_eq!(
            same,
            Conversion::Converted {
                data: data.clone(),
                mime: "text/markdown".into()
            }
        );
        let text = svc.convert_to(&fragment, data.clone(), "txt").await.unwrap();
        assert_eq!(
            text,
            Conversion::Converted {
                data,
                mime: "text/plain".into()
            }
        );
    }

    #[tokio::test]
    async fn unsupported_extension_is_signalled() {
        let svc = service();
        let fragment = svc
            .create("owner", "text/plain", Bytes::from_static(b"fragment"))
            .await
            .unwrap();
        let data = svc.get_data(&fragment).await.unwrap();
        assert_eq!(
            svc.convert_to(&fragment, data.clone(), "json").await.unwrap(),
            Conversion::Unsupported
        );
        assert_eq!(
            svc.convert_to(&fragment, data, "exe").await.unwrap(),
            Conversion::Unsupported
        );
    }

    #[tokio::test]
    async fn jpeg_converts_to_png() {
        let svc = service();
        let fragment = svc
            .create(
                "owner",
                "image/jpeg",
                Bytes::from(sample_image(ImageFormat::Jpeg)),
            )
            .await
            .unwrap();
        let data = svc.get_data(&fragment).await.unwrap();
        let Conversion::Converted { data, mime } =
            svc.convert_to(&fragment, data, "png").await.unwrap()
        else {
            panic!("expected conversion");
        };
        assert_eq!(mime, "image/png");
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Png);
    }

    #[tokio::test]
    async fn corrupt_image_surfaces_conversion_error() {
        let svc = service();
        let fragment = svc
            .create("owner", "image/png", Bytes::from_static(b"garbage"))
            .await
            .unwrap();
        let data = svc.get_data(&fragment).await.unwrap();
        assert!(matches!(
            svc.convert_to(&fragment, data, "gif").await,
            Err(FragmentError::Conversion(_))
        ));
    }
}
