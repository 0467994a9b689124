//! Business account: one per tenant, keyed by the tenant id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_core::validation::{Violations, normalize_email};
use spadesk_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, ensure_tenant};
use spadesk_events::Event;

use crate::settings::{LoyaltyProgram, NumberingPolicy, TaxSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub business_name: String,
    pub email: String,
    pub phone: Option<String>,
    /// ISO 4217 code, e.g. `INR`.
    pub currency: String,
}

impl AccountProfile {
    fn validate(&self) -> Result<(), DomainError> {
        let mut v = Violations::new();
        v.require_non_empty(&self.business_name, "business_name");
        v.require_email(&self.email, "email");
        v.check(
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_uppercase()),
            "currency must be a 3-letter uppercase code",
        );
        v.into_result()
    }

    fn normalized(&self) -> Self {
        Self {
            business_name: self.business_name.trim().to_string(),
            email: normalize_email(&self.email),
            phone: self.phone.as_ref().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            currency: self.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AggregateId,
    pub tenant_id: Option<TenantId>,
    pub profile: AccountProfile,
    pub tax: TaxSettings,
    pub numbering: NumberingPolicy,
    pub loyalty: LoyaltyProgram,
    pub opened_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created: bool,
}

impl Account {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            profile: AccountProfile {
                business_name: String::new(),
                email: String::new(),
                phone: None,
                currency: String::new(),
            },
            tax: TaxSettings::default(),
            numbering: NumberingPolicy::default(),
            loyalty: LoyaltyProgram::default(),
            opened_at: None,
            version: 0,
            created: false,
        }
    }

    fn ensure_open(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        ensure_tenant(self.tenant_id, tenant_id)
    }
}

impl AggregateRoot for Account {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccountCommand {
    Open {
        tenant_id: TenantId,
        profile: AccountProfile,
        occurred_at: DateTime<Utc>,
    },
    UpdateProfile {
        tenant_id: TenantId,
        business_name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
        currency: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    UpdateTaxSettings {
        tenant_id: TenantId,
        tax: TaxSettings,
        occurred_at: DateTime<Utc>,
    },
    UpdateNumbering {
        tenant_id: TenantId,
        numbering: NumberingPolicy,
        occurred_at: DateTime<Utc>,
    },
    UpdateLoyaltyProgram {
        tenant_id: TenantId,
        loyalty: LoyaltyProgram,
        occurred_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccountEvent {
    Opened {
        tenant_id: TenantId,
        profile: AccountProfile,
        occurred_at: DateTime<Utc>,
    },
    ProfileUpdated {
        profile: AccountProfile,
        occurred_at: DateTime<Utc>,
    },
    TaxSettingsUpdated {
        tax: TaxSettings,
        occurred_at: DateTime<Utc>,
    },
    NumberingUpdated {
        numbering: NumberingPolicy,
        occurred_at: DateTime<Utc>,
    },
    LoyaltyProgramUpdated {
        loyalty: LoyaltyProgram,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Opened { .. } => "accounts.account.opened",
            AccountEvent::ProfileUpdated { .. } => "accounts.account.profile_updated",
            AccountEvent::TaxSettingsUpdated { .. } => "accounts.account.tax_settings_updated",
            AccountEvent::NumberingUpdated { .. } => "accounts.account.numbering_updated",
            AccountEvent::LoyaltyProgramUpdated { .. } => "accounts.account.loyalty_program_updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Opened { occurred_at, .. }
            | AccountEvent::ProfileUpdated { occurred_at, .. }
            | AccountEvent::TaxSettingsUpdated { occurred_at, .. }
            | AccountEvent::NumberingUpdated { occurred_at, .. }
            | AccountEvent::LoyaltyProgramUpdated { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Opened {
                tenant_id,
                profile,
                occurred_at,
            } => {
                self.tenant_id = Some(*tenant_id);
                self.profile = profile.clone();
                self.opened_at = Some(*occurred_at);
                self.created = true;
            }
            AccountEvent::ProfileUpdated { profile, .. } => self.profile = profile.clone(),
            AccountEvent::TaxSettingsUpdated { tax, .. } => self.tax = *tax,
            AccountEvent::NumberingUpdated { numbering, .. } => self.numbering = numbering.clone(),
            AccountEvent::LoyaltyProgramUpdated { loyalty, .. } => self.loyalty = *loyalty,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::Open {
                tenant_id,
                profile,
                occurred_at,
            } => {
                if self.created {
                    return Err(DomainError::conflict("account already opened"));
                }
                if AggregateId::from(*tenant_id) != self.id {
                    return Err(DomainError::invariant("account id must equal tenant id"));
                }
                profile.validate()?;
                Ok(vec![AccountEvent::Opened {
                    tenant_id: *tenant_id,
                    profile: profile.normalized(),
                    occurred_at: *occurred_at,
                }])
            }
            AccountCommand::UpdateProfile {
                tenant_id,
                business_name,
                email,
                phone,
                currency,
                occurred_at,
            } => {
                self.ensure_open(*tenant_id)?;
                let mut profile = self.profile.clone();
                if let Some(name) = business_name {
                    profile.business_name = name.clone();
                }
                if let Some(email) = email {
                    profile.email = email.clone();
                }
                if let Some(phone) = phone {
                    profile.phone = Some(phone.clone());
                }
                if let Some(currency) = currency {
                    profile.currency = currency.clone();
                }
                profile.validate()?;
                Ok(vec![AccountEvent::ProfileUpdated {
                    profile: profile.normalized(),
                    occurred_at: *occurred_at,
                }])
            }
            AccountCommand::UpdateTaxSettings {
                tenant_id,
                tax,
                occurred_at,
            } => {
                self.ensure_open(*tenant_id)?;
                tax.validate()?;
                Ok(vec![AccountEvent::TaxSettingsUpdated {
                    tax: *tax,
                    occurred_at: *occurred_at,
                }])
            }
            AccountCommand::UpdateNumbering {
                tenant_id,
                numbering,
                occurred_at,
            } => {
                self.ensure_open(*tenant_id)?;
                numbering.validate()?;
                Ok(vec![AccountEvent::NumberingUpdated {
                    numbering: NumberingPolicy {
                        prefix: numbering.prefix.to_ascii_uppercase(),
                        ..numbering.clone()
                    },
                    occurred_at: *occurred_at,
                }])
            }
            AccountCommand::UpdateLoyaltyProgram {
                tenant_id,
                loyalty,
                occurred_at,
            } => {
                self.ensure_open(*tenant_id)?;
                loyalty.validate()?;
                Ok(vec![AccountEvent::LoyaltyProgramUpdated {
                    loyalty: *loyalty,
                    occurred_at: *occurred_at,
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spadesk_core::Rate;

    fn opened(tenant_id: TenantId) -> Account {
        let mut account = Account::empty(tenant_id.into());
        let cmd = AccountCommand::Open {
            tenant_id,
            profile: AccountProfile {
                business_name: " Lotus Spa ".into(),
                email: "Owner@Lotus.example".into(),
                phone: Some("".into()),
                currency: "INR".into(),
            },
            occurred_at: Utc::now(),
        };
        for e in account.handle(&cmd).unwrap() {
            account.apply(&e);
        }
        account
    }

    #[test]
    fn open_normalizes_profile() {
        let account = opened(TenantId::new());
        assert_eq!(account.profile.business_name, "Lotus Spa");
        assert_eq!(account.profile.email, "owner@lotus.example");
        assert_eq!(account.profile.phone, None);
        assert_eq!(account.numbering, NumberingPolicy::default());
    }

    #[test]
    fn account_id_is_the_tenant_id() {
        let account = Account::empty(AggregateId::new());
        let err = account
            .handle(&AccountCommand::Open {
                tenant_id: TenantId::new(),
                profile: AccountProfile {
                    business_name: "x".into(),
                    email: "a@b.co".into(),
                    phone: None,
                    currency: "USD".into(),
                },
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn tax_rate_above_hundred_percent_is_rejected() {
        let t = TenantId::new();
        let account = opened(t);
        let err = account
            .handle(&AccountCommand::UpdateTaxSettings {
                tenant_id: t,
                tax: TaxSettings {
                    default_rate: Rate::from_bps(10_001),
                    prices_include_tax: true,
                },
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn numbering_prefix_is_uppercased() {
        let t = TenantId::new();
        let mut account = opened(t);
        let events = account
            .handle(&AccountCommand::UpdateNumbering {
                tenant_id: t,
                numbering: NumberingPolicy {
                    prefix: "lsp".into(),
                    ..NumberingPolicy::default()
                },
                occurred_at: Utc::now(),
            })
            .unwrap();
        for e in &events {
            account.apply(e);
        }
        assert_eq!(account.numbering.prefix, "LSP");
        assert_eq!(account.version, 2);
    }

    #[test]
    fn patch_with_bad_currency_is_rejected() {
        let t = TenantId::new();
        let account = opened(t);
        let err = account
            .handle(&AccountCommand::UpdateProfile {
                tenant_id: t,
                business_name: None,
                email: None,
                phone: None,
                currency: Some("rupees".into()),
                occurred_at: Utc::now(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("currency must be a 3-letter uppercase code".into())
        );
    }
}
