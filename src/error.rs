use crate::types::MembershipOp;

/// Contract violations surfaced by the member view.
///
/// Every variant here means the event feed is corrupted or an upstream
/// verifier let something invalid through. Processing of the offending event
/// stops; the engine never patches state to make a bad event fit. Benign
/// races (confirming an unknown event, unpinning an absent pin, partial key
/// fulfillment) are silent no-ops and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum StreamViewError {
    #[error("{op} event for user {user_id} who is already joined")]
    UserAlreadyJoined { op: MembershipOp, user_id: String },

    #[error("{kind} event references unknown member {user_id}")]
    NotAMember {
        kind: &'static str,
        user_id: String,
    },

    #[error("unexpected {0} payload in member stream view")]
    UnexpectedPayload(&'static str),

    #[error("an unknown error occurred: {0}")]
    Other(#[from] anyhow::Error),
}
