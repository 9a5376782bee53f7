//! Response selection for a matched endpoint.
//!
//! Each endpoint's responses are prepared once into a [`ResponsePlan`]:
//! inactive responses are dropped, the rest are sorted by `order` (stable, so
//! declaration order breaks ties) and condition expressions are compiled.
//!
//! - `Sequential` rotates over the non-default responses using a cursor
//!   from the [`RotationStore`]; with no non-default responses it rotates
//!   over all of them
//! - `Random` picks uniformly among all active responses, default included
//! - `ConditionBased` takes the first response whose condition holds, then
//!   the default response, then the first response

mod rotation;

pub use rotation::{rotation_key, RotationCursor, RotationKey, RotationStore};

use crate::condition::CompiledCondition;
use crate::model::{ResponseDefinition, SelectionMode};
use crate::request::RequestContext;
use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone)]
enum ResponseCondition {
    Unconditional,
    Compiled(CompiledCondition),
    /// Failed to compile; never matches
    Invalid,
}

#[derive(Debug, Clone)]
struct PlannedResponse {
    definition: ResponseDefinition,
    condition: ResponseCondition,
}

/// Active responses of one endpoint, ordered and ready for selection.
#[derive(Debug, Clone)]
pub struct ResponsePlan {
    mode: SelectionMode,
    responses: Vec<PlannedResponse>,
}

impl ResponsePlan {
    pub fn compile(endpoint_id: &str, mode: SelectionMode, responses: &[ResponseDefinition]) -> Self {
        let mut active: Vec<&ResponseDefinition> = responses.iter().filter(|r| r.active).collect();
        active.sort_by_key(|r| r.order);

        let responses = active
            .into_iter()
            .map(|definition| {
                let condition = match definition.condition_expr() {
                    None => ResponseCondition::Unconditional,
                    Some(src) => match CompiledCondition::compile(src) {
                        Ok(compiled) => ResponseCondition::Compiled(compiled),
                        Err(e) => {
                            warn!(
                                endpoint = %endpoint_id,
                                response = %definition.id,
                                condition = %src,
                                error = %e,
                                "Response condition failed to compile and will never match"
                            );
                            ResponseCondition::Invalid
                        }
                    },
                };
                PlannedResponse {
                    definition: definition.clone(),
                    condition,
                }
            })
            .collect();

        Self { mode, responses }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    fn default_response(&self) -> Option<&ResponseDefinition> {
        self.responses
            .iter()
            .map(|r| &r.definition)
            .find(|r| r.is_default)
    }

    fn first(&self) -> Option<&ResponseDefinition> {
        self.responses.first().map(|r| &r.definition)
    }

    /// Pick a response; `None` when the endpoint has no active responses.
    pub fn select(
        &self,
        rotation_key: &RotationKey,
        ctx: &RequestContext,
        store: &RotationStore,
    ) -> Option<&ResponseDefinition> {
        if self.responses.is_empty() {
            return None;
        }

        match self.mode {
            SelectionMode::Sequential => {
                let rotating: Vec<&ResponseDefinition> = self
                    .responses
                    .iter()
                    .map(|r| &r.definition)
                    .filter(|r| !r.is_default)
                    .collect();
                if rotating.is_empty() {
                    let index = store.next_index(rotation_key, self.responses.len());
                    return self.responses.get(index).map(|r| &r.definition);
                }
                let index = store.next_index(rotation_key, rotating.len());
                rotating.get(index).copied()
            }
            SelectionMode::Random => {
                let index = rand::thread_rng().gen_range(0..self.responses.len());
                self.responses.get(index).map(|r| &r.definition)
            }
            SelectionMode::ConditionBased => self
                .responses
                .iter()
                .find(|r| match &r.condition {
                    ResponseCondition::Compiled(condition) => condition.evaluate(ctx),
                    _ => false,
                })
                .map(|r| &r.definition)
                .or_else(|| self.default_response())
                .or_else(|| self.first()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::HeaderMap;
    use std::collections::HashSet;

    fn response(id: &str, order: i32) -> ResponseDefinition {
        serde_json::from_value(serde_json::json!({ "id": id, "order": order, "body": id }))
            .unwrap()
    }

    fn ctx(query: &str) -> RequestContext {
        RequestContext::new("GET", "/items", Some(query), &HeaderMap::new(), None)
    }

    fn ids(plan: &ResponsePlan, store: &RotationStore, n: usize) -> Vec<String> {
        (0..n)
            .map(|_| plan.select(&rotation_key("p", "e"), &ctx(""), store).unwrap().id.clone())
            .collect()
    }

    #[test]
    fn test_sequential_orders_by_order_then_declaration() {
        let responses = vec![response("c", 5), response("a", 1), response("b", 1)];
        let plan = ResponsePlan::compile("e", SelectionMode::Sequential, &responses);
        let store = RotationStore::new();
        assert_eq!(ids(&plan, &store, 4), vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_sequential_skips_default_and_inactive() {
        let mut fallback = response("fallback", 0);
        fallback.is_default = true;
        let mut off = response("off", 2);
        off.active = false;
        let responses = vec![fallback, response("one", 1), off, response("two", 3)];
        let plan = ResponsePlan::compile("e", SelectionMode::Sequential, &responses);
        let store = RotationStore::new();
        assert_eq!(ids(&plan, &store, 3), vec!["one", "two", "one"]);
    }

    #[test]
    fn test_sequential_only_default() {
        let mut fallback = response("fallback", 0);
        fallback.is_default = true;
        let plan = ResponsePlan::compile("e", SelectionMode::Sequential, &[fallback]);
        let store = RotationStore::new();
        assert_eq!(ids(&plan, &store, 2), vec!["fallback", "fallback"]);
    }

    #[test]
    fn test_no_active_responses() {
        let mut off = response("off", 0);
        off.active = false;
        let plan = ResponsePlan::compile("e", SelectionMode::Random, &[off]);
        assert!(plan.is_empty());
        assert!(plan.select(&rotation_key("p", "e"), &ctx(""), &RotationStore::new()).is_none());
    }

    #[test]
    fn test_random_can_pick_default() {
        let mut fallback = response("fallback", 0);
        fallback.is_default = true;
        let plan = ResponsePlan::compile(
            "e",
            SelectionMode::Random,
            &[fallback, response("other", 1)],
        );
        let store = RotationStore::new();
        let seen: HashSet<String> = ids(&plan, &store, 200).into_iter().collect();
        assert!(seen.contains("fallback"));
        assert!(seen.contains("other"));
    }

    #[test]
    fn test_condition_based() {
        let mut premium = response("premium", 1);
        premium.condition = Some("query.tier == 'gold'".to_string());
        let mut big = response("big", 2);
        big.condition = Some("query.size > 100".to_string());
        let mut broken = response("broken", 0);
        broken.condition = Some("query.size >".to_string());
        let mut fallback = response("fallback", 3);
        fallback.is_default = true;

        let plan = ResponsePlan::compile(
            "e",
            SelectionMode::ConditionBased,
            &[premium, big, broken, fallback],
        );
        let store = RotationStore::new();
        let pick = |q: &str| plan.select(&rotation_key("p", "e"), &ctx(q), &store).unwrap().id.clone();

        assert_eq!(pick("tier=gold&size=500"), "premium");
        assert_eq!(pick("size=500"), "big");
        assert_eq!(pick("size=5"), "fallback");
    }

    #[test]
    fn test_condition_based_without_default_uses_first() {
        let mut only = response("conditional", 2);
        only.condition = Some("query.x == '1'".to_string());
        let plan = ResponsePlan::compile(
            "e",
            SelectionMode::ConditionBased,
            &[only, response("first", 1)],
        );
        let picked = plan.select(&rotation_key("p", "e"), &ctx(""), &RotationStore::new()).unwrap();
        assert_eq!(picked.id, "first");
    }
}
