use crate::models::{SlaPolicy, Ticket};

/// Select the applicable SLA policy for a ticket.
///
/// Policies are tried in the stable order the store returns them
/// (position order). The first active policy whose rule accepts the
/// ticket wins; a policy whose rule document cannot be parsed is logged
/// and skipped, never fatal. When nothing matches, the first active
/// policy serves as the fallback; an empty set yields `None` and callers
/// must tolerate a ticket without an SLA.
pub fn match_policy<'a>(ticket: &Ticket, active_policies: &'a [SlaPolicy]) -> Option<&'a SlaPolicy> {
    for policy in active_policies {
        let rule = match policy.parsed_rule() {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(
                    policy_id = %policy.id,
                    policy_name = %policy.name,
                    error = %e,
                    "Skipping policy with malformed rule"
                );
                continue;
            }
        };

        if rule.matches(ticket) {
            tracing::debug!(
                ticket_id = %ticket.id,
                policy_id = %policy.id,
                policy_name = %policy.name,
                "Matched SLA policy"
            );
            return Some(policy);
        }
    }

    let fallback = active_policies.first();
    if let Some(policy) = fallback {
        tracing::debug!(
            ticket_id = %ticket.id,
            policy_id = %policy.id,
            "No rule matched, using first active policy as fallback"
        );
    }
    fallback
}
