//! Credential registry.
//!
//! The registry is the only writer of credential ownership, approvals and
//! the `used` flag. The catalog and the market call into it under their own
//! identities and it re-checks every rule itself before committing.
//!
//! Minting is gated by a single mint authority. At deployment the authority
//! is the deployer; it is handed to the catalog exactly once.

use crate::aggregates::EventDirectory;
use crate::error::LedgerError;
use crate::notification::{ApprovalScope, LedgerNotification};
use crate::types::{Credential, EventId, MintRequest, TokenId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use turnstile_core::{Identity, Transition};

/// Ownership, approval and validation state of every credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRegistry {
    identity: Identity,
    mint_authority: Identity,
    authority_transferred: bool,
    next_token_id: TokenId,
    credentials: BTreeMap<TokenId, Credential>,
    holdings: BTreeMap<Identity, BTreeSet<TokenId>>,
    token_approvals: BTreeMap<TokenId, Identity>,
    operator_approvals: BTreeSet<(Identity, Identity)>,
}

impl CredentialRegistry {
    /// Creates an empty registry whose mint authority is `deployer`
    #[must_use]
    pub fn new(identity: Identity, deployer: Identity) -> Self {
        Self {
            identity,
            mint_authority: deployer,
            authority_transferred: false,
            next_token_id: TokenId::new(1),
            credentials: BTreeMap::new(),
            holdings: BTreeMap::new(),
            token_approvals: BTreeMap::new(),
            operator_approvals: BTreeSet::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Minting
    // ------------------------------------------------------------------------

    /// Hands minting rights to `new_authority`. Allowed once.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthority`] unless `caller` is the current authority
    /// - [`LedgerError::AuthorityAlreadyTransferred`] after the first handoff
    pub fn set_mint_authority(
        &mut self,
        caller: &Identity,
        new_authority: Identity,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        if caller != &self.mint_authority {
            return Err(LedgerError::NotAuthority {
                caller: caller.clone(),
            });
        }
        if self.authority_transferred {
            return Err(LedgerError::AuthorityAlreadyTransferred);
        }

        let previous = std::mem::replace(&mut self.mint_authority, new_authority.clone());
        self.authority_transferred = true;
        tracing::info!(%previous, current = %new_authority, "Mint authority transferred");

        Ok(
            Transition::new(()).notify(LedgerNotification::MintAuthorityTransferred {
                previous,
                current: new_authority,
            }),
        )
    }

    /// Fails unless `caller` may mint `count` more credentials
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotAuthority`] unless `caller` is the mint authority
    /// - [`LedgerError::ArithmeticOverflow`] if token ids would run out
    pub fn check_mint(&self, caller: &Identity, count: u32) -> Result<(), LedgerError> {
        if caller != &self.mint_authority {
            return Err(LedgerError::NotAuthority {
                caller: caller.clone(),
            });
        }
        // The last id handed out is next + count - 1; the counter itself must
        // still advance past it.
        self.next_token_id
            .value()
            .checked_add(u64::from(count))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Mints one credential and returns its id.
    ///
    /// # Errors
    ///
    /// Same as [`CredentialRegistry::check_mint`] for a count of one.
    pub fn mint(
        &mut self,
        caller: &Identity,
        request: MintRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition<TokenId, LedgerNotification>, LedgerError> {
        self.check_mint(caller, 1)?;
        let token_id = self.next_token_id;
        let next = token_id.next().ok_or(LedgerError::ArithmeticOverflow)?;

        let notification = LedgerNotification::CredentialMinted {
            token_id,
            event_id: request.event_id,
            ticket_type_id: request.ticket_type_id,
            owner: request.owner.clone(),
            purchase_price: request.purchase_price,
            origin_domain: request.origin_domain.clone(),
        };

        self.holdings
            .entry(request.owner.clone())
            .or_default()
            .insert(token_id);
        self.credentials.insert(
            token_id,
            Credential {
                token_id,
                event_id: request.event_id,
                ticket_type_id: request.ticket_type_id,
                original_owner: request.owner.clone(),
                current_owner: request.owner,
                purchase_price: request.purchase_price,
                origin_domain: request.origin_domain,
                metadata_locator: request.metadata_locator,
                used: false,
                minted_at: now,
                used_at: None,
            },
        );
        self.next_token_id = next;

        Ok(Transition::new(token_id).notify(notification))
    }

    // ------------------------------------------------------------------------
    // Transfers and approvals
    // ------------------------------------------------------------------------

    /// Runs every transfer rule without changing anything
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownCredential`] for an unminted token
    /// - [`LedgerError::NotOwner`] if `from` is not the holder
    /// - [`LedgerError::CredentialUsed`] once validated
    /// - [`LedgerError::NotApproved`] unless `caller` is `from` or approved
    pub fn check_transfer(
        &self,
        caller: &Identity,
        token_id: TokenId,
        from: &Identity,
    ) -> Result<&Credential, LedgerError> {
        let credential = self.require(token_id)?;
        if &credential.current_owner != from {
            return Err(LedgerError::NotOwner {
                token_id,
                caller: from.clone(),
            });
        }
        if credential.used {
            return Err(LedgerError::CredentialUsed { token_id });
        }
        if !self.may_operate(caller, token_id, from) {
            return Err(LedgerError::NotApproved {
                token_id,
                caller: caller.clone(),
            });
        }
        Ok(credential)
    }

    /// Moves a credential from `from` to `to`
    ///
    /// Clears any single-token approval.
    ///
    /// # Errors
    ///
    /// See [`CredentialRegistry::check_transfer`]; nothing changes on error.
    pub fn transfer(
        &mut self,
        caller: &Identity,
        token_id: TokenId,
        from: &Identity,
        to: Identity,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        self.check_transfer(caller, token_id, from)?;

        if let Some(held) = self.holdings.get_mut(from) {
            held.remove(&token_id);
            if held.is_empty() {
                self.holdings.remove(from);
            }
        }
        self.holdings.entry(to.clone()).or_default().insert(token_id);
        self.token_approvals.remove(&token_id);
        if let Some(credential) = self.credentials.get_mut(&token_id) {
            credential.current_owner = to.clone();
        }

        Ok(
            Transition::new(()).notify(LedgerNotification::CredentialTransferred {
                token_id,
                from: from.clone(),
                to,
            }),
        )
    }

    /// Lets `operator` move one credential, or clears the approval with `None`
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownCredential`] for an unminted token
    /// - [`LedgerError::NotOwner`] unless `caller` holds it
    /// - [`LedgerError::CredentialUsed`] once validated
    pub fn approve(
        &mut self,
        caller: &Identity,
        token_id: TokenId,
        operator: Option<Identity>,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        let credential = self.require(token_id)?;
        if &credential.current_owner != caller {
            return Err(LedgerError::NotOwner {
                token_id,
                caller: caller.clone(),
            });
        }
        if credential.used {
            return Err(LedgerError::CredentialUsed { token_id });
        }

        match &operator {
            Some(operator) => {
                self.token_approvals.insert(token_id, operator.clone());
            }
            None => {
                self.token_approvals.remove(&token_id);
            }
        }

        Ok(Transition::new(()).notify(LedgerNotification::ApprovalChanged {
            owner: caller.clone(),
            approved: operator.is_some(),
            operator,
            scope: ApprovalScope::Token(token_id),
        }))
    }

    /// Grants or revokes `operator` the right to move all of `caller`'s credentials
    pub fn set_approval_for_all(
        &mut self,
        caller: &Identity,
        operator: Identity,
        approved: bool,
    ) -> Transition<(), LedgerNotification> {
        let key = (caller.clone(), operator.clone());
        if approved {
            self.operator_approvals.insert(key);
        } else {
            self.operator_approvals.remove(&key);
        }

        Transition::new(()).notify(LedgerNotification::ApprovalChanged {
            owner: caller.clone(),
            operator: Some(operator),
            scope: ApprovalScope::AllCredentials,
            approved,
        })
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Consumes a credential. Irreversible.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownCredential`] for an unminted token
    /// - [`LedgerError::NotAuthority`] unless `caller` organizes the
    ///   credential's event
    /// - [`LedgerError::AlreadyUsed`] on a second validation
    pub fn mark_used(
        &mut self,
        caller: &Identity,
        token_id: TokenId,
        directory: &dyn EventDirectory,
        now: DateTime<Utc>,
    ) -> Result<Transition<(), LedgerNotification>, LedgerError> {
        let credential = self.require(token_id)?;
        if directory.organizer_of(credential.event_id) != Some(caller) {
            return Err(LedgerError::NotAuthority {
                caller: caller.clone(),
            });
        }
        if credential.used {
            return Err(LedgerError::AlreadyUsed { token_id });
        }

        let event_id = credential.event_id;
        let holder = credential.current_owner.clone();
        if let Some(credential) = self.credentials.get_mut(&token_id) {
            credential.used = true;
            credential.used_at = Some(now);
        }
        self.token_approvals.remove(&token_id);

        Ok(Transition::new(()).notify(LedgerNotification::CredentialValidated {
            token_id,
            event_id,
            holder,
            validated_by: caller.clone(),
        }))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// The registry's own identity
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Who may currently mint
    #[must_use]
    pub const fn mint_authority(&self) -> &Identity {
        &self.mint_authority
    }

    /// Whether the one-time authority handoff has happened
    #[must_use]
    pub const fn authority_transferred(&self) -> bool {
        self.authority_transferred
    }

    /// A credential by id
    #[must_use]
    pub fn credential(&self, token_id: TokenId) -> Option<&Credential> {
        self.credentials.get(&token_id)
    }

    /// Current holder of a credential
    #[must_use]
    pub fn owner_of(&self, token_id: TokenId) -> Option<&Identity> {
        self.credentials
            .get(&token_id)
            .map(|credential| &credential.current_owner)
    }

    /// Credentials currently held by `owner`, in id order
    #[must_use]
    pub fn tokens_of(&self, owner: &Identity) -> Vec<TokenId> {
        self.holdings
            .get(owner)
            .map(|held| held.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Credentials of one event, in id order
    pub fn credentials_for(&self, event_id: EventId) -> impl Iterator<Item = &Credential> {
        self.credentials
            .values()
            .filter(move |credential| credential.event_id == event_id)
    }

    /// Number of credentials ever minted
    #[must_use]
    pub fn minted(&self) -> usize {
        self.credentials.len()
    }

    /// Operator approved for a single credential, if any
    #[must_use]
    pub fn approved_operator(&self, token_id: TokenId) -> Option<&Identity> {
        self.token_approvals.get(&token_id)
    }

    /// Whether `operator` may move every credential of `owner`
    #[must_use]
    pub fn is_approved_for_all(&self, owner: &Identity, operator: &Identity) -> bool {
        self.operator_approvals
            .contains(&(owner.clone(), operator.clone()))
    }

    /// Whether `operator` holds the credential or may move it for the holder
    #[must_use]
    pub fn is_approved_or_owner(&self, operator: &Identity, token_id: TokenId) -> bool {
        self.owner_of(token_id)
            .is_some_and(|owner| self.may_operate(operator, token_id, owner))
    }

    fn may_operate(&self, caller: &Identity, token_id: TokenId, owner: &Identity) -> bool {
        caller == owner
            || self.approved_operator(token_id) == Some(caller)
            || self.is_approved_for_all(owner, caller)
    }

    fn require(&self, token_id: TokenId) -> Result<&Credential, LedgerError> {
        self.credentials
            .get(&token_id)
            .ok_or(LedgerError::UnknownCredential { token_id })
    }
}
