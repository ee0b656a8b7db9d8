//! Article index and article lookup endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use dbranch_core::{Article, ArticleIndex, ArticleList, ContentId, validate_article_name};
use serde::{Deserialize, Serialize};

use crate::cache::get_or_compute_json;
use crate::error::ApiError;
use crate::state::AppState;

const INDEX_CACHE_KEY: &str = "article_index";

/// An article together with the list it was found in.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleResponse {
    pub name: String,
    pub list: ArticleList,
    #[serde(flatten)]
    pub article: Article,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    /// Restrict the lookup to `curated` or `published`.
    pub list: Option<String>,
}

/// The index document as the curator wrote it.
async fn cached_index_json(state: &AppState) -> Result<String, ApiError> {
    get_or_compute_json(&state.cache, INDEX_CACHE_KEY, || async {
        match state.store.read_index_raw().await? {
            Some(data) => String::from_utf8(data)
                .map_err(|e| ApiError::Internal(anyhow::anyhow!("index is not UTF-8: {}", e))),
            None => serde_json::to_string(&ArticleIndex::default())
                .map_err(|e| ApiError::Internal(e.into())),
        }
    })
    .await
}

async fn cached_index(state: &AppState) -> Result<ArticleIndex, ApiError> {
    let json = cached_index_json(state).await?;
    serde_json::from_str(&json).map_err(|e| ApiError::Internal(e.into()))
}

/// Look `name` up in each of `lists`, in order.
async fn find_article(
    state: &AppState,
    name: &str,
    lists: &[ArticleList],
) -> Result<ArticleResponse, ApiError> {
    for &list in lists {
        match state.store.read_article(list, name).await {
            Ok(article) => {
                return Ok(ArticleResponse {
                    name: name.to_string(),
                    list,
                    article,
                });
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::NotFound(format!("article {}", name)))
}

/// `GET /api/v0/article/index`
///
/// The persisted index document, byte for byte. A node that has not built one
/// yet serves an empty index.
pub async fn article_index(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let json = cached_index_json(&state).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json))
}

/// `GET /api/v0/article/{name}?list=curated|published`
///
/// Curated articles shadow published ones of the same name unless `list` is
/// given.
pub async fn article_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<ArticleResponse>, ApiError> {
    validate_article_name(&name).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let lists = match query.list.as_deref() {
        Some(list) => vec![
            list.parse::<ArticleList>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ],
        None => ArticleList::ALL.to_vec(),
    };

    Ok(Json(find_article(&state, &name, &lists).await?))
}

/// `GET /api/v0/article/cid/{cid}`
pub async fn article_by_cid(
    State(state): State<AppState>,
    Path(cid): Path<String>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let cid = ContentId::new(cid.trim());
    if cid.as_str().is_empty() {
        return Err(ApiError::BadRequest("empty cid".to_string()));
    }

    let index = cached_index(&state).await?;
    let Some((list, record)) = index.find_by_cid(&cid) else {
        return Err(ApiError::NotFound(format!("article with cid {}", cid)));
    };

    Ok(Json(find_article(&state, &record.name, &[list]).await?))
}
