// ==========================================
// 贷款数据带导入系统 - 卖方解析
// ==========================================
// 解析顺序（首个命中胜出）:
// 显式 ID → 显式名称 → 发件人/主题规则 → AI 推断 → 自动创建 / 失败
// 红线: 同等强度的多个命中且未开启自动创建 → AmbiguousSeller
// 红线: 试运行下的自动创建只生成占位上下文,不写库
// ==========================================

use crate::ai::completion::CompletionBackend;
use crate::domain::seller::{Seller, SellerContext, SellerHint, SellerResolution, SellerRule};
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::seller_repo::SellerRepository;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 解析策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvePolicy {
    pub auto_create: bool,
    pub dry_run: bool,
    pub disable_ai: bool,
}

#[async_trait]
pub trait SellerResolver: Send + Sync {
    async fn resolve(&self, hint: &SellerHint, policy: ResolvePolicy) -> ImportResult<SellerContext>;
}

/// 单个层级的判定
enum Tier {
    Hit(Seller),
    Ambiguous(Vec<String>),
    Miss,
}

// ==========================================
// SellerResolverImpl
// ==========================================
pub struct SellerResolverImpl<R>
where
    R: SellerRepository,
{
    repo: Arc<R>,
    completion: Option<Arc<dyn CompletionBackend>>,
    confidence_threshold: f32,
    retry: RetryPolicy,
}

impl<R> SellerResolverImpl<R>
where
    R: SellerRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            completion: None,
            confidence_threshold: 1.0,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_completion(
        mut self,
        backend: Arc<dyn CompletionBackend>,
        confidence_threshold: f32,
        retry: RetryPolicy,
    ) -> Self {
        self.completion = Some(backend);
        self.confidence_threshold = confidence_threshold;
        self.retry = retry;
        self
    }

    // ===== 显式名称 =====
    async fn by_name(&self, name: &str) -> ImportResult<Tier> {
        if let Some(seller) = self.repo.find_seller_by_name(name).await? {
            return Ok(Tier::Hit(seller));
        }

        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Tier::Miss);
        }
        let mut candidates: Vec<Seller> = self
            .repo
            .list_sellers()
            .await?
            .into_iter()
            .filter(|s| {
                let known = s.name.to_lowercase();
                known.contains(&needle) || needle.contains(&known)
            })
            .collect();

        Ok(match candidates.len() {
            0 => Tier::Miss,
            1 => Tier::Hit(candidates.remove(0)),
            _ => Tier::Ambiguous(candidates.into_iter().map(|s| s.name).collect()),
        })
    }

    // ===== 发件人/主题规则 =====
    async fn by_rules(&self, hint: &SellerHint) -> ImportResult<Tier> {
        let rules = self.repo.list_rules().await?;
        let matched: Vec<&SellerRule> = rules.iter().filter(|r| rule_matches(r, hint)).collect();
        let Some(best) = matched.iter().map(|r| r.priority).min() else {
            return Ok(Tier::Miss);
        };

        let seller_ids: BTreeSet<i64> = matched
            .iter()
            .filter(|r| r.priority == best)
            .map(|r| r.seller_id)
            .collect();

        if seller_ids.len() > 1 {
            let mut names = Vec::new();
            for id in &seller_ids {
                if let Some(seller) = self.repo.find_seller(*id).await? {
                    names.push(seller.name);
                }
            }
            return Ok(Tier::Ambiguous(names));
        }

        match seller_ids.into_iter().next() {
            Some(id) => Ok(self.repo.find_seller(id).await?.map(Tier::Hit).unwrap_or(Tier::Miss)),
            None => Ok(Tier::Miss),
        }
    }

    // ===== AI 推断 =====
    /// 返回 (命中卖方, 建议名称, 建议交易名)
    async fn by_ai(&self, hint: &SellerHint) -> ImportResult<(Option<Seller>, Option<String>, Option<String>)> {
        let Some(backend) = &self.completion else {
            return Ok((None, None, None));
        };

        let known: Vec<String> = self.repo.list_sellers().await?.into_iter().map(|s| s.name).collect();
        let suggestion = self
            .retry
            .run("ai.suggest_seller", || backend.suggest_seller(hint, &known))
            .await;

        let suggestion = match suggestion {
            Ok(Some(s)) => s,
            Ok(None) => return Ok((None, None, None)),
            Err(err) => {
                warn!(error = %err, "AI 卖方推断不可用,跳过该层级");
                return Ok((None, None, None));
            }
        };

        if suggestion.confidence < self.confidence_threshold {
            debug!(
                confidence = suggestion.confidence,
                threshold = self.confidence_threshold,
                "AI 卖方建议置信度不足"
            );
            return Ok((None, None, None));
        }
        let Some(name) = suggestion.seller_name else {
            return Ok((None, None, suggestion.trade_name));
        };

        let seller = self.repo.find_seller_by_name(&name).await?;
        Ok((seller, Some(name), suggestion.trade_name))
    }

    /// 在已确定的卖方下解析交易
    async fn with_trade(
        &self,
        seller: &Seller,
        hint: &SellerHint,
        suggested_trade: Option<&str>,
        resolution: SellerResolution,
        policy: ResolvePolicy,
    ) -> ImportResult<SellerContext> {
        if let Some(trade_id) = hint.trade_id {
            let trade = self
                .repo
                .find_trade(trade_id)
                .await?
                .filter(|t| t.seller_id == seller.seller_id)
                .ok_or_else(|| {
                    ImportError::UnresolvedSeller(format!(
                        "交易 {} 不存在或不属于卖方 {}",
                        trade_id, seller.name
                    ))
                })?;
            return Ok(SellerContext::from_seller(seller, Some(&trade), resolution));
        }

        let explicit = hint.trade_name.as_deref();
        let Some(trade_name) = explicit.or(suggested_trade) else {
            return Ok(SellerContext::from_seller(seller, None, resolution));
        };

        if let Some(trade) = self.repo.find_trade_by_name(seller.seller_id, trade_name).await? {
            return Ok(SellerContext::from_seller(seller, Some(&trade), resolution));
        }

        if policy.auto_create {
            if policy.dry_run {
                let mut context = SellerContext::from_seller(seller, None, resolution);
                context.trade_name = Some(trade_name.to_string());
                return Ok(context);
            }
            let trade = self.repo.create_trade(seller.seller_id, trade_name).await?;
            info!(seller_id = seller.seller_id, trade_id = trade.trade_id, "自动创建交易");
            return Ok(SellerContext::from_seller(seller, Some(&trade), resolution));
        }

        if explicit.is_some() {
            return Err(ImportError::UnresolvedSeller(format!(
                "卖方 {} 下不存在交易 '{}'",
                seller.name, trade_name
            )));
        }
        // AI 建议的交易名找不到时不阻断
        Ok(SellerContext::from_seller(seller, None, resolution))
    }

    async fn create(&self, name: &str, hint: &SellerHint, policy: ResolvePolicy) -> ImportResult<SellerContext> {
        if policy.dry_run {
            debug!(seller_name = %name, "试运行: 卖方占位,不写库");
            return Ok(SellerContext {
                seller_id: None,
                seller_name: name.to_string(),
                trade_id: None,
                trade_name: hint.trade_name.clone(),
                resolution: SellerResolution::Provisional,
                tape_password: None,
            });
        }

        let seller = self.repo.create_seller(name).await?;
        info!(seller_id = seller.seller_id, seller_name = %seller.name, "自动创建卖方");
        self.with_trade(&seller, hint, None, SellerResolution::Created, policy).await
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "卖方规则正则无效,忽略");
            None
        }
    }
}

/// 规则中出现的每个模式都必须命中
fn rule_matches(rule: &SellerRule, hint: &SellerHint) -> bool {
    let checks = [
        (rule.sender_pattern.as_deref(), hint.sender.as_deref()),
        (rule.subject_pattern.as_deref(), hint.subject.as_deref()),
    ];
    let mut any = false;
    for (pattern, value) in checks {
        let Some(pattern) = pattern else { continue };
        let (Some(re), Some(value)) = (compile(pattern), value) else {
            return false;
        };
        if !re.is_match(value) {
            return false;
        }
        any = true;
    }
    any
}

fn hint_label(hint: &SellerHint) -> String {
    hint.seller_name
        .clone()
        .or_else(|| hint.sender.clone())
        .or_else(|| hint.subject.clone())
        .unwrap_or_else(|| "-".to_string())
}

#[async_trait]
impl<R> SellerResolver for SellerResolverImpl<R>
where
    R: SellerRepository,
{
    #[instrument(skip_all, fields(seller_id = ?hint.seller_id, seller_name = ?hint.seller_name))]
    async fn resolve(&self, hint: &SellerHint, policy: ResolvePolicy) -> ImportResult<SellerContext> {
        // 1. 显式 ID
        if let Some(seller_id) = hint.seller_id {
            let seller = self
                .repo
                .find_seller(seller_id)
                .await?
                .ok_or_else(|| ImportError::UnresolvedSeller(format!("卖方 ID {} 不存在", seller_id)))?;
            return self
                .with_trade(&seller, hint, None, SellerResolution::ExplicitId, policy)
                .await;
        }
        if let Some(trade_id) = hint.trade_id {
            let trade = self
                .repo
                .find_trade(trade_id)
                .await?
                .ok_or_else(|| ImportError::UnresolvedSeller(format!("交易 ID {} 不存在", trade_id)))?;
            let seller = self
                .repo
                .find_seller(trade.seller_id)
                .await?
                .ok_or_else(|| ImportError::UnresolvedSeller(format!("卖方 ID {} 不存在", trade.seller_id)))?;
            return Ok(SellerContext::from_seller(&seller, Some(&trade), SellerResolution::ExplicitId));
        }

        // 2. 显式名称
        if let Some(name) = hint.seller_name.as_deref() {
            match self.by_name(name).await? {
                Tier::Hit(seller) => {
                    return self
                        .with_trade(&seller, hint, None, SellerResolution::ExplicitName, policy)
                        .await
                }
                Tier::Ambiguous(candidates) if !policy.auto_create => {
                    return Err(ImportError::AmbiguousSeller {
                        hint: name.to_string(),
                        candidates,
                    })
                }
                _ => {}
            }
        }

        // 3. 规则
        if hint.has_message_context() {
            match self.by_rules(hint).await? {
                Tier::Hit(seller) => {
                    return self.with_trade(&seller, hint, None, SellerResolution::Rule, policy).await
                }
                Tier::Ambiguous(candidates) if !policy.auto_create => {
                    return Err(ImportError::AmbiguousSeller {
                        hint: hint_label(hint),
                        candidates,
                    })
                }
                _ => {}
            }
        }

        // 4. AI
        let mut suggested_name = None;
        if !policy.disable_ai && hint.has_message_context() {
            let (seller, name, trade) = self.by_ai(hint).await?;
            if let Some(seller) = seller {
                return self
                    .with_trade(&seller, hint, trade.as_deref(), SellerResolution::Ai, policy)
                    .await;
            }
            suggested_name = name;
        }

        // 5. 自动创建
        if policy.auto_create {
            if let Some(name) = hint.seller_name.clone().or(suggested_name) {
                return self.create(&name, hint, policy).await;
            }
        }

        Err(ImportError::UnresolvedSeller(format!(
            "没有匹配的卖方: {}",
            hint_label(hint)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::completion::{MappingSuggestion, SellerSuggestion};
    use crate::ai::llm_client::LlmError;
    use crate::domain::field_registry::CanonicalFieldSpec;
    use crate::repository::seller_repo::SellerRepositoryImpl;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn repo() -> Arc<SellerRepositoryImpl> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        Arc::new(SellerRepositoryImpl::from_connection(Arc::new(Mutex::new(conn))))
    }

    struct FixedSeller(Option<SellerSuggestion>);

    #[async_trait]
    impl CompletionBackend for FixedSeller {
        async fn suggest_mapping(
            &self,
            _columns: &[String],
            _fields: &[CanonicalFieldSpec],
        ) -> Result<Vec<MappingSuggestion>, LlmError> {
            Ok(vec![])
        }

        async fn suggest_seller(
            &self,
            _hint: &SellerHint,
            _known_sellers: &[String],
        ) -> Result<Option<SellerSuggestion>, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn message_hint(sender: &str, subject: &str) -> SellerHint {
        SellerHint {
            sender: Some(sender.to_string()),
            subject: Some(subject.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_explicit_id_and_name() {
        let repo = repo();
        let acme = repo.create_seller("Acme Capital").await.unwrap();
        let resolver = SellerResolverImpl::new(repo.clone());

        let hint = SellerHint {
            seller_id: Some(acme.seller_id),
            ..Default::default()
        };
        let ctx = resolver.resolve(&hint, ResolvePolicy::default()).await.unwrap();
        assert_eq!(ctx.resolution, SellerResolution::ExplicitId);

        let hint = SellerHint {
            seller_name: Some("acme".to_string()),
            ..Default::default()
        };
        let ctx = resolver.resolve(&hint, ResolvePolicy::default()).await.unwrap();
        assert_eq!(ctx.seller_id, Some(acme.seller_id));
        assert_eq!(ctx.resolution, SellerResolution::ExplicitName);
    }

    #[tokio::test]
    async fn test_ambiguous_name_without_auto_create() {
        let repo = repo();
        repo.create_seller("Acme Capital").await.unwrap();
        repo.create_seller("Acme Lending").await.unwrap();
        let resolver = SellerResolverImpl::new(repo);

        let hint = SellerHint {
            seller_name: Some("acme".to_string()),
            ..Default::default()
        };
        let err = resolver.resolve(&hint, ResolvePolicy::default()).await.unwrap_err();
        match err {
            ImportError::AmbiguousSeller { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rules_pick_best_priority() {
        let repo = repo();
        let acme = repo.create_seller("Acme").await.unwrap();
        let beta = repo.create_seller("Beta").await.unwrap();
        repo.add_rule(acme.seller_id, Some("@acme\\.com$"), None, 10).await.unwrap();
        repo.add_rule(beta.seller_id, None, Some("tape"), 50).await.unwrap();
        let resolver = SellerResolverImpl::new(repo);

        let ctx = resolver
            .resolve(&message_hint("ops@ACME.com", "March tape"), ResolvePolicy::default())
            .await
            .unwrap();
        assert_eq!(ctx.seller_id, Some(acme.seller_id));
        assert_eq!(ctx.resolution, SellerResolution::Rule);
    }

    #[tokio::test]
    async fn test_rules_tie_is_ambiguous() {
        let repo = repo();
        let acme = repo.create_seller("Acme").await.unwrap();
        let beta = repo.create_seller("Beta").await.unwrap();
        repo.add_rule(acme.seller_id, None, Some("tape"), 10).await.unwrap();
        repo.add_rule(beta.seller_id, None, Some("tape"), 10).await.unwrap();
        let resolver = SellerResolverImpl::new(repo);

        let err = resolver
            .resolve(&message_hint("x@y.com", "tape"), ResolvePolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::AmbiguousSeller { .. }));
    }

    #[tokio::test]
    async fn test_ai_respects_threshold() {
        let repo = repo();
        let acme = repo.create_seller("Acme").await.unwrap();
        let hint = message_hint("x@y.com", "portfolio");

        let confident = SellerResolverImpl::new(repo.clone()).with_completion(
            Arc::new(FixedSeller(Some(SellerSuggestion {
                seller_name: Some("ACME".to_string()),
                trade_name: None,
                confidence: 0.9,
            }))),
            0.75,
            RetryPolicy::none(),
        );
        let ctx = confident.resolve(&hint, ResolvePolicy::default()).await.unwrap();
        assert_eq!(ctx.seller_id, Some(acme.seller_id));
        assert_eq!(ctx.resolution, SellerResolution::Ai);

        let doubtful = SellerResolverImpl::new(repo).with_completion(
            Arc::new(FixedSeller(Some(SellerSuggestion {
                seller_name: Some("Acme".to_string()),
                trade_name: None,
                confidence: 0.4,
            }))),
            0.75,
            RetryPolicy::none(),
        );
        let err = doubtful.resolve(&hint, ResolvePolicy::default()).await.unwrap_err();
        assert!(matches!(err, ImportError::UnresolvedSeller(_)));
    }

    #[tokio::test]
    async fn test_auto_create_and_dry_run_placeholder() {
        let repo = repo();
        let resolver = SellerResolverImpl::new(repo.clone());
        let hint = SellerHint {
            seller_name: Some("New Seller".to_string()),
            trade_name: Some("2024-Q2".to_string()),
            ..Default::default()
        };

        let dry = ResolvePolicy {
            auto_create: true,
            dry_run: true,
            ..Default::default()
        };
        let ctx = resolver.resolve(&hint, dry).await.unwrap();
        assert!(ctx.is_provisional());
        assert!(repo.list_sellers().await.unwrap().is_empty());

        let live = ResolvePolicy {
            auto_create: true,
            ..Default::default()
        };
        let ctx = resolver.resolve(&hint, live).await.unwrap();
        assert_eq!(ctx.resolution, SellerResolution::Created);
        assert!(ctx.seller_id.is_some());
        assert!(ctx.trade_id.is_some());
    }

    #[tokio::test]
    async fn test_unresolved_without_auto_create() {
        let resolver = SellerResolverImpl::new(repo());
        let hint = SellerHint {
            seller_name: Some("Nobody".to_string()),
            ..Default::default()
        };
        let err = resolver.resolve(&hint, ResolvePolicy::default()).await.unwrap_err();
        assert!(matches!(err, ImportError::UnresolvedSeller(_)));
    }
}
