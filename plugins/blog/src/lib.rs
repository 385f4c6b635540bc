//! Blog extension for Vivaio.
//!
//! Provides a `Post` content type with a title, body, tags, and a cover
//! image. Posts are writable through the content API and searchable by
//! title, body, and tags; editor notes never leave the server.

use serde::{Deserialize, Serialize};
use vivaio_sdk::prelude::*;

/// A blog post.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Content)]
#[content(hooks)]
#[serde(default)]
pub struct Post {
    #[serde(flatten)]
    pub item: Item,
    #[content(search)]
    pub title: String,
    #[content(search)]
    pub body: String,
    #[content(search)]
    pub tags: Vec<String>,

    /// Public URL of the cover image, usually set from an upload.
    pub cover: String,

    #[content(private)]
    pub editor_notes: String,
}

#[async_trait]
impl Hookable for Post {
    async fn before_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(HookError::rejected("a post needs a title"));
        }
        if self.item.slug.trim().is_empty() {
            self.item.slug = slugify(&self.title);
        }

        // Tags are kept in submission order, without blanks or repeats.
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.drain(..) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.tags = tags;
        Ok(())
    }
}

#[attach]
pub fn attach(registrar: &mut dyn Registrar) {
    registrar.register_default::<Post>("Post");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Vec<String>);

    impl Registrar for Collect {
        fn register(&mut self, name: &str, _constructor: Constructor) {
            self.0.push(name.to_string());
        }
    }

    fn ctx() -> HookContext {
        HookContext::new(Operation::Create, "Post", Caller::anonymous())
    }

    #[test]
    fn attach_registers_post() {
        let mut registrar = Collect::default();
        attach(&mut registrar);
        assert_eq!(registrar.0, vec!["Post"]);
    }

    #[tokio::test]
    async fn slug_follows_title() {
        let mut post = Post {
            title: "  Hello, Vivaio!  ".into(),
            tags: vec!["rust".into(), " ".into(), "rust".into(), "cms".into()],
            ..Post::default()
        };
        post.before_save(&ctx()).await.unwrap();
        assert_eq!(post.title, "Hello, Vivaio!");
        assert_eq!(post.item.slug, "hello-vivaio");
        assert_eq!(post.tags, vec!["rust", "cms"]);
    }

    #[tokio::test]
    async fn explicit_slug_is_kept() {
        let mut post = Post {
            title: "Hello".into(),
            ..Post::default()
        };
        post.item.slug = "custom".into();
        post.before_save(&ctx()).await.unwrap();
        assert_eq!(post.item.slug, "custom");
    }

    #[tokio::test]
    async fn untitled_post_is_rejected() {
        let mut post = Post::default();
        let err = post.before_save(&ctx()).await.unwrap_err();
        assert!(matches!(err, HookError::Rejected(_)));
    }

    #[test]
    fn editor_notes_are_private() {
        let post = Post::default();
        assert_eq!(post.omitted_fields(&Caller::authorized()), vec!["editor_notes"]);
        let names: Vec<String> = post.field_schema().into_iter().map(|f| f.name).collect();
        assert!(names.contains(&"tags".to_string()));
        assert!(names.starts_with(&["uuid".to_string(), "id".to_string()]));
    }

    #[test]
    fn searchable_fields() {
        assert_eq!(Post::default().search_fields(), vec!["title", "body", "tags"]);
    }
}
