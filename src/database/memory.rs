// 内存文档集合
// 查询语义与 Postgres 实现保持一致，用于测试和未配置数据库时的本地运行

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Collection, DocQuery, Document, SearchField, Sort, StoreError};

pub struct MemoryCollection<D> {
    documents: RwLock<Vec<D>>,
}

impl<D> Default for MemoryCollection<D> {
    fn default() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
        }
    }
}

impl<D: Document> MemoryCollection<D> {
    fn matching(documents: &[D], query: &DocQuery) -> Result<Vec<D>, StoreError> {
        let mut matched = Vec::new();
        for doc in documents {
            if query.active_only && !doc.is_active() {
                continue;
            }
            if query.filter.is_some() || query.search.is_some() {
                let body = serde_json::to_value(doc)?;
                if let Some(filter) = &query.filter {
                    if !contains(&body, filter) {
                        continue;
                    }
                }
                if let Some(search) = &query.search {
                    if !search.fields.is_empty() && !matches_search(&body, &search.term, &search.fields)
                    {
                        continue;
                    }
                }
            }
            matched.push(doc.clone());
        }
        Ok(matched)
    }

    fn sort(documents: &mut [D], sort: Sort) -> Result<(), StoreError> {
        match sort {
            Sort::Newest => documents.sort_by(|a, b| b.created_at().cmp(&a.created_at())),
            Sort::Oldest => documents.sort_by_key(|doc| doc.created_at()),
            Sort::FieldDesc(path) => {
                let mut keyed = Vec::with_capacity(documents.len());
                for doc in documents.iter() {
                    let body = serde_json::to_value(doc)?;
                    keyed.push((numeric_at(&body, path), doc.clone()));
                }
                keyed.sort_by(|(a_key, a), (b_key, b)| {
                    compare_desc(*a_key, *b_key).then_with(|| b.created_at().cmp(&a.created_at()))
                });
                for (slot, (_, doc)) in documents.iter_mut().zip(keyed) {
                    *slot = doc;
                }
            }
        }
        Ok(())
    }

    fn check_unique(documents: &[D], doc: &D) -> Result<(), StoreError> {
        if D::UNIQUE_FIELDS.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(doc)?;
        for other in documents.iter().filter(|other| other.id() != doc.id()) {
            let other_body = serde_json::to_value(other)?;
            for field in D::UNIQUE_FIELDS {
                if body.get(field).is_some() && body.get(field) == other_body.get(field) {
                    return Err(StoreError::Duplicate(field.to_string()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<D: Document> Collection<D> for MemoryCollection<D> {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|doc| doc.id() == id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<D>, StoreError> {
        let documents = self.documents.read().await;
        let mut found: Vec<D> = documents
            .iter()
            .filter(|doc| ids.contains(&doc.id()))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(found)
    }

    async fn find(&self, query: &DocQuery) -> Result<Vec<D>, StoreError> {
        let documents = self.documents.read().await;
        let mut matched = Self::matching(&documents, query)?;
        drop(documents);

        Self::sort(&mut matched, query.sort)?;
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, query: &DocQuery) -> Result<u64, StoreError> {
        let documents = self.documents.read().await;
        let matched = Self::matching(&documents, query)?;
        Ok(matched.len() as u64)
    }

    async fn insert(&self, doc: &D) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        if documents.iter().any(|existing| existing.id() == doc.id()) {
            return Err(StoreError::Duplicate("id".into()));
        }
        Self::check_unique(&documents, doc)?;
        documents.push(doc.clone());
        Ok(())
    }

    async fn replace(&self, doc: &D) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        Self::check_unique(&documents, doc)?;
        let slot = documents
            .iter_mut()
            .find(|existing| existing.id() == doc.id())
            .ok_or(StoreError::Missing {
                collection: D::COLLECTION,
                id: doc.id(),
            })?;
        *slot = doc.clone();
        Ok(())
    }

    async fn deactivate_matching(&self, filter: &Value) -> Result<u64, StoreError> {
        let mut documents = self.documents.write().await;
        let mut affected = 0;
        for doc in documents.iter_mut().filter(|doc| doc.is_active()) {
            let mut body = serde_json::to_value(&*doc)?;
            if !contains(&body, filter) {
                continue;
            }
            if let Some(object) = body.as_object_mut() {
                object.insert("isActive".into(), Value::Bool(false));
            }
            *doc = serde_json::from_value(body)?;
            affected += 1;
        }
        Ok(affected)
    }
}

/// JSON 包含判断，对应 Postgres 的 `@>`
fn contains(target: &Value, pattern: &Value) -> bool {
    match (target, pattern) {
        (Value::Object(target), Value::Object(pattern)) => pattern
            .iter()
            .all(|(key, value)| target.get(key).is_some_and(|field| contains(field, value))),
        (Value::Array(target), Value::Array(pattern)) => pattern
            .iter()
            .all(|wanted| target.iter().any(|item| contains(item, wanted))),
        // 数组包含单个标量
        (Value::Array(target), scalar) if !scalar.is_object() => target.contains(scalar),
        (target, pattern) => target == pattern,
    }
}

fn matches_search(body: &Value, term: &str, fields: &[SearchField]) -> bool {
    let term = term.to_lowercase();
    let hit = |value: &Value| {
        value
            .as_str()
            .is_some_and(|text| text.to_lowercase().contains(&term))
    };

    fields.iter().any(|field| match field {
        SearchField::Text(name) => body.get(name).is_some_and(&hit),
        SearchField::TextArray(name) => body
            .get(name)
            .and_then(Value::as_array)
            .is_some_and(|items| items.iter().any(&hit)),
    })
}

fn numeric_at(body: &Value, path: &[&str]) -> Option<i64> {
    path.iter()
        .try_fold(body, |value, segment| value.get(segment))
        .and_then(Value::as_i64)
}

// 缺失的值排在最后
fn compare_desc(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::post::Visibility;
    use crate::models::{Post, User};
    use serde_json::json;

    fn user(email: &str) -> User {
        User::new("Asha".into(), email.into(), "hash".into(), None)
    }

    fn post(author: Uuid, group: Uuid, content: &str, tags: &[&str]) -> Post {
        Post::new(
            author,
            group,
            content,
            Vec::new(),
            tags.iter().map(|t| t.to_string()).collect(),
            Visibility::Group,
        )
        .unwrap()
    }

    #[test]
    fn containment_matches_like_jsonb() {
        let body = json!({
            "group": "g1",
            "members": [{"user": "a", "role": "admin"}, {"user": "b", "role": "member"}],
            "tags": ["rust", "ai"],
        });

        assert!(contains(&body, &json!({"group": "g1"})));
        assert!(contains(&body, &json!({"members": [{"user": "b"}]})));
        assert!(contains(&body, &json!({"tags": ["ai"]})));
        assert!(!contains(&body, &json!({"members": [{"user": "c"}]})));
        assert!(!contains(&body, &json!({"group": "g2"})));
    }

    #[tokio::test]
    async fn duplicate_unique_field_is_rejected() {
        let users = MemoryCollection::<User>::default();
        users.insert(&user("asha@srishakthi.ac.in")).await.unwrap();

        let err = users
            .insert(&user("asha@srishakthi.ac.in"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(field) if field == "email"));
    }

    #[tokio::test]
    async fn replace_requires_existing_document() {
        let users = MemoryCollection::<User>::default();
        let err = users.replace(&user("x@srishakthi.ac.in")).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn find_filters_searches_and_pages() {
        let posts = MemoryCollection::<Post>::default();
        let author = Uuid::new_v4();
        let group = Uuid::new_v4();

        let mut liked = post(author, group, "Robotics meetup", &["robots"]);
        liked.toggle_like(Uuid::new_v4());
        liked.toggle_like(Uuid::new_v4());
        liked.before_save();
        posts.insert(&liked).await.unwrap();
        posts
            .insert(&post(author, group, "Exam tips", &["study"]))
            .await
            .unwrap();
        posts
            .insert(&post(author, Uuid::new_v4(), "Other group", &[]))
            .await
            .unwrap();

        let in_group = DocQuery::active().filter(json!({ "group": group }));
        assert_eq!(posts.count(&in_group).await.unwrap(), 2);

        let search = in_group.clone().search(
            Some("ROBOT".into()),
            &[SearchField::Text("content"), SearchField::TextArray("tags")],
        );
        let found = posts.find(&search).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, liked.id);

        let tag_search = in_group
            .clone()
            .search(Some("stud".into()), &[SearchField::TextArray("tags")]);
        assert_eq!(posts.count(&tag_search).await.unwrap(), 1);

        let most_liked = in_group
            .clone()
            .sort(Sort::FieldDesc(&["engagement", "likeCount"]))
            .page(0, 1);
        let top = posts.find(&most_liked).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, liked.id);
    }

    #[tokio::test]
    async fn deactivate_matching_hides_documents() {
        let posts = MemoryCollection::<Post>::default();
        let group = Uuid::new_v4();
        let author = Uuid::new_v4();
        posts.insert(&post(author, group, "one", &[])).await.unwrap();
        posts.insert(&post(author, group, "two", &[])).await.unwrap();
        let other = post(author, Uuid::new_v4(), "three", &[]);
        posts.insert(&other).await.unwrap();

        let affected = posts
            .deactivate_matching(&json!({ "group": group }))
            .await
            .unwrap();

        assert_eq!(affected, 2);
        assert_eq!(posts.count(&DocQuery::active()).await.unwrap(), 1);
        assert!(posts.find_active(other.id).await.unwrap().is_some());
    }
}
