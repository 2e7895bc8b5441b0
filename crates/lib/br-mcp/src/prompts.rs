use br_core::store::QueryExecutor;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{PromptMessage, PromptMessageRole},
    prompt,
    prompt_router,
    schemars,
};
use serde::{Deserialize, Serialize};

use crate::BrMcp;

const PROMPT_EN: &str = r"You are an assistant answering questions about business requests (BRs).

Use the tools of this server instead of guessing:
1. Call `list_search_fields` before filtering so you only use known field names.
   Text fields match by substring. Date fields take YYYY-MM-DD values and an operator
   (=, <>, <, <=, >, >=).
2. Call `list_statuses` to translate a status name into its status id.
3. Call `search_business_requests` with `br_numbers`, `statuses`, `filters`, `limit` and `active`.
   Only active BRs are returned unless `active` is false. At most 100 rows are returned unless
   `limit` says otherwise; `TotalCount` gives the full number of matches.
4. Call `get_business_requests` when the user names specific BR numbers.
5. Call `get_business_requests_context` to recall which filters produced the last result.

Answer in English. Quote BR numbers and titles exactly as returned, and say when a result
was capped by the row limit.";

const PROMPT_FR: &str = r"Vous êtes un assistant qui répond aux questions sur les demandes opérationnelles (DO).

Utilisez les outils de ce serveur plutôt que de deviner :
1. Appelez `list_search_fields` avant de filtrer afin d'utiliser uniquement des champs connus.
   Les champs texte correspondent par sous-chaîne. Les champs date prennent des valeurs AAAA-MM-JJ
   et un opérateur (=, <>, <, <=, >, >=).
2. Appelez `list_statuses` pour traduire un nom de statut en identifiant de statut.
3. Appelez `search_business_requests` avec `br_numbers`, `statuses`, `filters`, `limit` et `active`.
   Seules les DO actives sont retournées sauf si `active` vaut false. Au plus 100 lignes sont
   retournées sauf indication contraire de `limit`; `TotalCount` donne le nombre total de résultats.
4. Appelez `get_business_requests` lorsque l'utilisateur nomme des numéros de DO précis.
5. Appelez `get_business_requests_context` pour retrouver les filtres du dernier résultat.

Répondez en français, en utilisant les champs _FR lorsqu'ils existent. Citez les numéros et titres
de DO tels que retournés et indiquez lorsqu'un résultat a été limité.";

/// Arguments for the business request system prompt.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PromptArgs {
    /// `fr` for French, anything else for English.
    pub language: String,
}

fn prompt_text(language: &str) -> &'static str {
    if language.trim().eq_ignore_ascii_case("fr") {
        PROMPT_FR
    } else {
        PROMPT_EN
    }
}

#[prompt_router(router = "prompt_router_br", vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[prompt(
        name = "business_request_prompt",
        description = "System prompt used to answer business request questions with this server's tools."
    )]
    async fn business_request_prompt(
        &self,
        Parameters(args): Parameters<PromptArgs>,
    ) -> Result<Vec<PromptMessage>, ErrorData> {
        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            prompt_text(&args.language),
        )])
    }
}
