//! Core types for the ledger store
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Owning entity identifier (a person or a business)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Create new entity ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw transaction identifier (string form, globally unique)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create from an existing string (e.g. an imported statement row ID)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh globally-unique ID
    pub fn generate() -> Self {
        Self(format!("txn-{}", Uuid::new_v4()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Indonesian Rupiah
    IDR,
    /// Singapore Dollar
    SGD,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::IDR => "IDR",
            Currency::SGD => "SGD",
        }
    }

    /// Parse from string
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "USD" => Some(Currency::USD),
            "EUR" => Some(Currency::EUR),
            "GBP" => Some(Currency::GBP),
            "IDR" => Some(Currency::IDR),
            "SGD" => Some(Currency::SGD),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Rounding tolerance for amount comparisons (0.01 currency units)
///
/// Accounts for floating-point rounding in imported data, not a business
/// allowance.
pub fn rounding_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Bank account
    Bank,
    /// Cash on hand
    Cash,
    /// Credit card (debt)
    CreditCard,
    /// Revolving credit line (debt)
    CreditLine,
    /// Term loan owed by the entity (debt)
    TermLoan,
    /// Loan receivable (money lent out)
    LoanReceivable,
    /// Investment account
    Investment,
}

impl AccountType {
    /// Debt-type accounts carry a credit limit and can host debt drawdowns
    pub fn is_debt(&self) -> bool {
        matches!(
            self,
            AccountType::CreditCard | AccountType::CreditLine | AccountType::TermLoan
        )
    }

    /// Accounts that can be the cash side of a drawdown or disbursement
    pub fn is_cash_side(&self) -> bool {
        matches!(self, AccountType::Bank | AccountType::Cash)
    }
}

/// A tracked account belonging to one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,

    /// Owning entity
    pub entity_id: EntityId,

    /// Display name
    pub name: String,

    /// Account type
    pub account_type: AccountType,

    /// Currency
    pub currency: Currency,

    /// Credit limit (debt-type accounts only)
    pub credit_limit: Option<Decimal>,

    /// Soft-deactivation flag; accounts with transactions are never deleted
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Debit/credit direction of a transaction amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Debit side
    Debit,
    /// Credit side
    Credit,
}

/// The single amount of a raw transaction
///
/// Exactly one of debit/credit is set; the enum makes the XOR invariant
/// unrepresentable to violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryAmount {
    /// Debit amount (money out, statement convention)
    Debit(Decimal),
    /// Credit amount (money in, statement convention)
    Credit(Decimal),
}

impl EntryAmount {
    /// The unsigned amount
    pub fn amount(&self) -> Decimal {
        match self {
            EntryAmount::Debit(a) | EntryAmount::Credit(a) => *a,
        }
    }

    /// Which side the amount sits on
    pub fn direction(&self) -> Direction {
        match self {
            EntryAmount::Debit(_) => Direction::Debit,
            EntryAmount::Credit(_) => Direction::Credit,
        }
    }

    /// Signed flow: credits positive, debits negative
    pub fn signed(&self) -> Decimal {
        match self {
            EntryAmount::Debit(a) => -*a,
            EntryAmount::Credit(a) => *a,
        }
    }
}

/// Source-of-truth ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Globally unique ID
    pub id: TransactionId,

    /// Account this entry belongs to
    pub account_id: AccountId,

    /// Ledger date
    pub date: NaiveDate,

    /// Same-day tie-break ordering
    pub sequence: u32,

    /// Description (statement text or user entry)
    pub description: String,

    /// The single debit-or-credit amount
    pub entry: EntryAmount,

    /// Running balance declared by the source (imported statement rows)
    pub declared_balance: Option<Decimal>,

    /// Correction entry, excluded from reconciliation flow sums
    pub is_balance_adjustment: bool,

    /// Checkpoint this entry was imported under
    pub checkpoint_id: Option<Uuid>,

    /// Free-form notes (the only field mutable after insert)
    pub notes: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Transaction type code
///
/// Closed catalog of type codes; `pairs_with` encodes the legal two-sided
/// combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Transfer out of an account
    TransferOut,
    /// Transfer into an account
    TransferIn,
    /// Credit card payment
    CreditCardPayment,
    /// Debt drawdown (money drawn from a credit line)
    DebtTake,
    /// Debt repayment
    DebtPay,
    /// Loan disbursement (money lent out)
    LoanDisburse,
    /// Loan collection (repayment received)
    LoanCollect,
    /// Loan/debt write-off adjustment
    LoanWriteOff,
    /// Settlement entry generated when a repayment is applied to a drawdown
    Settlement,
    /// Credit memo generated for an overpayment
    CreditMemo,
    /// Generic income (default for uncategorized credits)
    Income,
    /// Generic expense (default for uncategorized debits)
    Expense,
}

impl TransactionType {
    /// Catalog code
    pub fn code(&self) -> &'static str {
        match self {
            TransactionType::TransferOut => "TRF_OUT",
            TransactionType::TransferIn => "TRF_IN",
            TransactionType::CreditCardPayment => "CC_PAY",
            TransactionType::DebtTake => "DEBT_TAKE",
            TransactionType::DebtPay => "DEBT_PAY",
            TransactionType::LoanDisburse => "LOAN_DISBURSE",
            TransactionType::LoanCollect => "LOAN_COLLECT",
            TransactionType::LoanWriteOff => "LOAN_WRITEOFF",
            TransactionType::Settlement => "SETTLEMENT",
            TransactionType::CreditMemo => "CREDIT_MEMO",
            TransactionType::Income => "INCOME",
            TransactionType::Expense => "EXPENSE",
        }
    }

    /// Parse from catalog code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "TRF_OUT" => Some(TransactionType::TransferOut),
            "TRF_IN" => Some(TransactionType::TransferIn),
            "CC_PAY" => Some(TransactionType::CreditCardPayment),
            "DEBT_TAKE" => Some(TransactionType::DebtTake),
            "DEBT_PAY" => Some(TransactionType::DebtPay),
            "LOAN_DISBURSE" => Some(TransactionType::LoanDisburse),
            "LOAN_COLLECT" => Some(TransactionType::LoanCollect),
            "LOAN_WRITEOFF" => Some(TransactionType::LoanWriteOff),
            "SETTLEMENT" => Some(TransactionType::Settlement),
            "CREDIT_MEMO" => Some(TransactionType::CreditMemo),
            "INCOME" => Some(TransactionType::Income),
            "EXPENSE" => Some(TransactionType::Expense),
            _ => None,
        }
    }

    /// Whether two types form a legal matched pair
    ///
    /// Symmetric in its arguments; any combination outside this table is
    /// rejected by the pairing engine.
    pub fn pairs_with(&self, other: TransactionType) -> bool {
        use TransactionType::*;
        matches!(
            (*self, other),
            (TransferOut, TransferIn)
                | (TransferIn, TransferOut)
                | (CreditCardPayment, CreditCardPayment)
                | (DebtTake, DebtTake)
                | (DebtPay, DebtPay)
                | (LoanDisburse, LoanDisburse)
                | (LoanCollect, LoanCollect)
        )
    }

    /// Repayment-side types that can settle a drawdown
    pub fn is_repayment(&self) -> bool {
        matches!(self, TransactionType::DebtPay | TransactionType::LoanCollect)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Categorized, possibly-split view derived from a raw transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainTransaction {
    /// Unique ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Raw transaction this row derives from (shared across splits)
    pub raw_transaction_id: TransactionId,

    /// Account (inherited from the raw transaction)
    pub account_id: AccountId,

    /// Transaction type
    pub transaction_type: TransactionType,

    /// User-assigned category
    pub category_id: Option<Uuid>,

    /// Line-item amount; splits of one raw transaction sum to its amount
    pub amount: Decimal,

    /// Direction (inherited from the raw transaction)
    pub direction: Direction,

    /// Ledger date (inherited)
    pub date: NaiveDate,

    /// Description (inherited, or split line notes)
    pub description: String,

    /// Whether this row is one of several splits
    pub is_split: bool,

    /// 1..N, unique per raw transaction
    pub split_sequence: u32,

    /// Symmetric link to the paired transaction on the other account
    pub matched_transaction_id: Option<Uuid>,

    /// Drawdown this transaction draws on or settles
    pub drawdown_id: Option<Uuid>,

    /// Explicit credit-memo link to the overpaid drawdown
    pub credit_memo_of_drawdown_id: Option<Uuid>,

    /// For settlement rows: the repayment transaction they settle
    pub settles_transaction_id: Option<Uuid>,
}

impl MainTransaction {
    /// Default categorization applied immediately after every raw insert,
    /// in the same write batch
    ///
    /// Credits default to income, debits to expense; the split and pairing
    /// engines overwrite type and category afterwards.
    pub fn derived_from(raw: &RawTransaction) -> Self {
        let transaction_type = match raw.entry.direction() {
            Direction::Credit => TransactionType::Income,
            Direction::Debit => TransactionType::Expense,
        };

        Self {
            id: Uuid::now_v7(),
            raw_transaction_id: raw.id.clone(),
            account_id: raw.account_id.clone(),
            transaction_type,
            category_id: None,
            amount: raw.entry.amount(),
            direction: raw.entry.direction(),
            date: raw.date,
            description: raw.description.clone(),
            is_split: false,
            split_sequence: 1,
            matched_transaction_id: None,
            drawdown_id: None,
            credit_memo_of_drawdown_id: None,
            settles_transaction_id: None,
        }
    }

    /// Whether this transaction is one side of a matched pair
    pub fn is_matched(&self) -> bool {
        self.matched_transaction_id.is_some()
    }

    /// Drawdowns this row references (for dependent-record lookups)
    pub fn drawdown_links(&self) -> Vec<Uuid> {
        let mut links = Vec::new();
        if let Some(id) = self.drawdown_id {
            links.push(id);
        }
        if let Some(id) = self.credit_memo_of_drawdown_id {
            if !links.contains(&id) {
                links.push(id);
            }
        }
        links
    }
}

/// Where a checkpoint's declared balance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointSource {
    /// User-declared balance
    Manual,
    /// Imported statement balance
    Import,
}

impl fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointSource::Manual => write!(f, "manual"),
            CheckpointSource::Import => write!(f, "import"),
        }
    }
}

/// Externally declared account balance as of a date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique ID
    pub id: Uuid,

    /// Account
    pub account_id: AccountId,

    /// Checkpoint date
    pub date: NaiveDate,

    /// Externally asserted truth (bank statement, user declaration)
    pub declared_balance: Decimal,

    /// System-derived balance at declaration time, kept for audit
    pub calculated_balance: Option<Decimal>,

    /// Import batch, when the checkpoint came from a statement import
    pub import_batch_id: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Import if an import batch is set, manual otherwise
    pub fn source(&self) -> CheckpointSource {
        if self.import_batch_id.is_some() {
            CheckpointSource::Import
        } else {
            CheckpointSource::Manual
        }
    }
}

/// Cached running balance for an account
///
/// Derived from the transaction log; never authoritative over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account
    pub account_id: AccountId,

    /// Net balance (credits minus debits over the full log)
    pub balance: Decimal,

    /// Date of the last transaction included
    pub as_of: NaiveDate,

    /// Recompute timestamp
    pub computed_at: DateTime<Utc>,
}

/// Debt or loan side of a drawdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownKind {
    /// Money drawn against a credit line / card / term loan
    Debt,
    /// Money lent out, tracked on a loan-receivable account
    Loan,
}

/// Drawdown lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownStatus {
    /// Open, repayable
    Active,
    /// Some principal written off, remainder open
    PartiallyWrittenOff,
    /// Fully written off (terminal)
    WrittenOff,
    /// Fully repaid (terminal)
    Settled,
    /// Past due date with balance outstanding
    Overdue,
}

/// Principal outstanding against a debt or loan account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drawdown {
    /// Unique ID
    pub id: Uuid,

    /// Debt or loan
    pub kind: DrawdownKind,

    /// The debt/loan account
    pub account_id: AccountId,

    /// Business partner on the other end
    pub counterparty_id: Uuid,

    /// Original principal
    pub principal_amount: Decimal,

    /// Invariant: principal − Σ(principal payments) − written_off, ≥ 0
    pub remaining_balance: Decimal,

    /// Total written off so far
    pub written_off_amount: Decimal,

    /// Lifecycle status
    pub status: DrawdownStatus,

    /// Date the drawdown was recorded
    pub opened_on: NaiveDate,

    /// Optional due date
    pub due_date: Option<NaiveDate>,
}

impl Drawdown {
    /// Terminal statuses admit no further payments or write-offs
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            DrawdownStatus::WrittenOff | DrawdownStatus::Settled
        )
    }

    /// Apply a principal payment
    ///
    /// The amount must be positive and must not exceed the remaining
    /// balance; overpayment handling (credit memos) happens before this is
    /// called.
    pub fn apply_principal_payment(&mut self, amount: Decimal) -> crate::Result<()> {
        if amount <= Decimal::ZERO {
            return Err(crate::Error::Validation(
                "principal payment must be positive".to_string(),
            ));
        }
        if amount > self.remaining_balance {
            return Err(crate::Error::Validation(format!(
                "principal payment {} exceeds remaining balance {}",
                amount, self.remaining_balance
            )));
        }

        self.remaining_balance -= amount;
        if self.remaining_balance.is_zero() {
            self.status = DrawdownStatus::Settled;
        }

        Ok(())
    }

    /// Reverse a previously applied principal payment (unmatch cascade)
    pub fn restore_principal_payment(&mut self, amount: Decimal) {
        self.remaining_balance += amount;
        self.status = if self.written_off_amount > Decimal::ZERO {
            DrawdownStatus::PartiallyWrittenOff
        } else {
            DrawdownStatus::Active
        };
    }

    /// Write off part or all of the remaining balance
    ///
    /// Rejected when already fully written off or when the amount exceeds
    /// the remaining balance; the balance is never clamped.
    pub fn apply_write_off(&mut self, amount: Decimal) -> crate::Result<()> {
        if self.status == DrawdownStatus::WrittenOff {
            return Err(crate::Error::Validation(format!(
                "drawdown {} is already fully written off",
                self.id
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(crate::Error::Validation(
                "write-off amount must be positive".to_string(),
            ));
        }
        if amount > self.remaining_balance {
            return Err(crate::Error::Validation(format!(
                "write-off amount {} exceeds remaining balance {}",
                amount, self.remaining_balance
            )));
        }

        self.remaining_balance -= amount;
        self.written_off_amount += amount;
        self.status = if self.remaining_balance.is_zero() {
            DrawdownStatus::WrittenOff
        } else {
            DrawdownStatus::PartiallyWrittenOff
        };

        Ok(())
    }
}

/// Business partner referenced by drawdowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterparty {
    /// Unique ID
    pub id: Uuid,

    /// Owning entity
    pub entity_id: EntityId,

    /// Display name
    pub name: String,
}
