//! In-memory `ArticleStore` for handler tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{Article, ArticleStore, Registration, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<Vec<Article>>,
    unavailable: bool,
}

impl MemoryStore {
    /// A store whose every call fails like a lost database connection
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.articles.lock().unwrap().iter().map(|a| a.name.clone()).collect()
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn register_article(&self, name: &str) -> StoreResult<Registration> {
        self.check()?;
        let mut articles = self.articles.lock().unwrap();
        if articles.iter().any(|a| a.name == name) {
            return Ok(Registration::AlreadyTracked);
        }
        let article = Article {
            id: articles.len() as i32 + 1,
            name: name.to_string(),
        };
        articles.push(article.clone());
        Ok(Registration::Created(article))
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.check()
    }
}
