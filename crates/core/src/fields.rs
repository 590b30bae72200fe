//! Logical-field vocabulary and the subtotal taxonomy.
//!
//! Logical fields are the named computable slots of the declaration,
//! identified by `LF_*` codes. The groupings here drive the base-total
//! and derived-total phases of the engine as well as the auto-flags.

/// Income from sale of real property in Kazakhstan.
pub const INCOME_PROPERTY_KZ: &str = "LF_INCOME_PROPERTY_KZ";
/// Income from sale of real property abroad.
pub const INCOME_PROPERTY_FOREIGN: &str = "LF_INCOME_PROPERTY_FOREIGN";
/// Income from sale of vehicles.
pub const INCOME_PROPERTY_VEHICLE: &str = "LF_INCOME_PROPERTY_VEHICLE";
/// Subtotal over the three property-sale fields.
pub const INCOME_PROPERTY_TOTAL: &str = "LF_INCOME_PROPERTY_TOTAL";

/// Foreign dividends.
pub const INCOME_FOREIGN_DIVIDENDS: &str = "LF_INCOME_FOREIGN_DIVIDENDS";
/// Foreign interest.
pub const INCOME_FOREIGN_INTEREST: &str = "LF_INCOME_FOREIGN_INTEREST";
/// Foreign royalties.
pub const INCOME_FOREIGN_ROYALTY: &str = "LF_INCOME_FOREIGN_ROYALTY";
/// Foreign employment income.
pub const INCOME_FOREIGN_EMPLOYMENT: &str = "LF_INCOME_FOREIGN_EMPLOYMENT";
/// Foreign capital gains.
pub const INCOME_FOREIGN_CAPITAL_GAINS: &str = "LF_INCOME_FOREIGN_CAPITAL_GAINS";
/// Foreign rental income.
pub const INCOME_FOREIGN_RENT: &str = "LF_INCOME_FOREIGN_RENT";
/// Foreign pensions.
pub const INCOME_FOREIGN_PENSION: &str = "LF_INCOME_FOREIGN_PENSION";
/// Foreign business income.
pub const INCOME_FOREIGN_BUSINESS: &str = "LF_INCOME_FOREIGN_BUSINESS";
/// Other foreign income.
pub const INCOME_FOREIGN_OTHER: &str = "LF_INCOME_FOREIGN_OTHER";
/// Subtotal over the nine foreign-income fields.
pub const INCOME_FOREIGN_TOTAL: &str = "LF_INCOME_FOREIGN_TOTAL";

/// Standard deduction.
pub const DEDUCTION_STANDARD: &str = "LF_DEDUCTION_STANDARD";
/// Other deductions.
pub const DEDUCTION_OTHER: &str = "LF_DEDUCTION_OTHER";
/// Subtotal over deductions.
pub const DEDUCTION_TOTAL: &str = "LF_DEDUCTION_TOTAL";

/// Exempt-income adjustment.
pub const ADJUSTMENT_EXEMPT: &str = "LF_ADJUSTMENT_EXEMPT";
/// Double-taxation adjustment.
pub const ADJUSTMENT_DOUBLE_TAX: &str = "LF_ADJUSTMENT_DOUBLE_TAX";
/// Correction adjustment.
pub const ADJUSTMENT_CORRECTION: &str = "LF_ADJUSTMENT_CORRECTION";
/// Other adjustments.
pub const ADJUSTMENT_OTHER: &str = "LF_ADJUSTMENT_OTHER";
/// Subtotal over the four adjustment fields.
pub const ADJUSTMENT_TOTAL: &str = "LF_ADJUSTMENT_TOTAL";

/// Employment income not withheld by a tax agent.
pub const INCOME_EMPLOYMENT_NON_AGENT: &str = "LF_INCOME_EMPLOYMENT_NON_AGENT";
/// Civil-contract income not withheld by a tax agent.
pub const INCOME_CIVIL_CONTRACT_NON_AGENT: &str = "LF_INCOME_CIVIL_CONTRACT_NON_AGENT";
/// Domestic dividends not withheld by a tax agent.
pub const INCOME_DIVIDENDS_NON_AGENT: &str = "LF_INCOME_DIVIDENDS_NON_AGENT";
/// Domestic interest not withheld by a tax agent.
pub const INCOME_INTEREST_NON_AGENT: &str = "LF_INCOME_INTEREST_NON_AGENT";
/// Winnings not withheld by a tax agent.
pub const INCOME_WINNINGS_NON_AGENT: &str = "LF_INCOME_WINNINGS_NON_AGENT";
/// Other domestic income not withheld by a tax agent.
pub const INCOME_OTHER_NON_AGENT: &str = "LF_INCOME_OTHER_NON_AGENT";

/// Rental income not withheld by a tax agent.
pub const INCOME_RENT_NON_AGENT: &str = "LF_INCOME_RENT_NON_AGENT";
/// Income from assignment of claim rights.
pub const INCOME_ASSIGNMENT: &str = "LF_INCOME_ASSIGNMENT";
/// Income from sale of intellectual property and other assets.
pub const INCOME_IP_OTHER_ASSETS: &str = "LF_INCOME_IP_OTHER_ASSETS";
/// Profit of controlled foreign companies.
pub const INCOME_CFC_PROFIT: &str = "LF_INCOME_CFC_PROFIT";

/// Credit for foreign tax paid on general income.
pub const FOREIGN_TAX_CREDIT_GENERAL: &str = "LF_FOREIGN_TAX_CREDIT_GENERAL";
/// Credit for foreign tax paid on CFC profit.
pub const FOREIGN_TAX_CREDIT_CFC: &str = "LF_FOREIGN_TAX_CREDIT_CFC";

/// Total annual income.
pub const INCOME_TOTAL: &str = "LF_INCOME_TOTAL";
/// Taxable income after adjustments and deductions.
pub const TAXABLE_INCOME: &str = "LF_TAXABLE_INCOME";
/// Personal income tax at the 10% rate.
pub const IPN_CALCULATED: &str = "LF_IPN_CALCULATED";
/// Tax payable after foreign tax credits.
pub const IPN_PAYABLE: &str = "LF_IPN_PAYABLE";

/// The three property-sale fields feeding [`INCOME_PROPERTY_TOTAL`].
pub const PROPERTY_FIELDS: [&str; 3] = [
    INCOME_PROPERTY_KZ,
    INCOME_PROPERTY_FOREIGN,
    INCOME_PROPERTY_VEHICLE,
];

/// The nine foreign-income fields feeding [`INCOME_FOREIGN_TOTAL`].
pub const FOREIGN_FIELDS: [&str; 9] = [
    INCOME_FOREIGN_DIVIDENDS,
    INCOME_FOREIGN_INTEREST,
    INCOME_FOREIGN_ROYALTY,
    INCOME_FOREIGN_EMPLOYMENT,
    INCOME_FOREIGN_CAPITAL_GAINS,
    INCOME_FOREIGN_RENT,
    INCOME_FOREIGN_PENSION,
    INCOME_FOREIGN_BUSINESS,
    INCOME_FOREIGN_OTHER,
];

/// The deduction fields feeding [`DEDUCTION_TOTAL`].
pub const DEDUCTION_FIELDS: [&str; 2] = [DEDUCTION_STANDARD, DEDUCTION_OTHER];

/// The four adjustment fields feeding [`ADJUSTMENT_TOTAL`].
pub const ADJUSTMENT_FIELDS: [&str; 4] = [
    ADJUSTMENT_EXEMPT,
    ADJUSTMENT_DOUBLE_TAX,
    ADJUSTMENT_CORRECTION,
    ADJUSTMENT_OTHER,
];

/// The six domestic non-agent income categories.
pub const NON_AGENT_FIELDS: [&str; 6] = [
    INCOME_EMPLOYMENT_NON_AGENT,
    INCOME_CIVIL_CONTRACT_NON_AGENT,
    INCOME_DIVIDENDS_NON_AGENT,
    INCOME_INTEREST_NON_AGENT,
    INCOME_WINNINGS_NON_AGENT,
    INCOME_OTHER_NON_AGENT,
];

/// The twelve primary income categories feeding [`INCOME_TOTAL`].
pub const PRIMARY_INCOME_FIELDS: [&str; 12] = [
    INCOME_PROPERTY_TOTAL,
    INCOME_RENT_NON_AGENT,
    INCOME_ASSIGNMENT,
    INCOME_IP_OTHER_ASSETS,
    INCOME_FOREIGN_TOTAL,
    INCOME_EMPLOYMENT_NON_AGENT,
    INCOME_CIVIL_CONTRACT_NON_AGENT,
    INCOME_DIVIDENDS_NON_AGENT,
    INCOME_INTEREST_NON_AGENT,
    INCOME_WINNINGS_NON_AGENT,
    INCOME_OTHER_NON_AGENT,
    INCOME_CFC_PROFIT,
];

/// Declaration flag names.
pub mod flags {
    /// Any income was reported.
    pub const HAS_INCOME: &str = "has_income";
    /// Any foreign income was reported.
    pub const HAS_FOREIGN_INCOME: &str = "has_foreign_income";
    /// CFC profit was reported.
    pub const HAS_CFC: &str = "has_cfc";
    /// Deductions were claimed.
    pub const HAS_DEDUCTIONS: &str = "has_deductions";
    /// Appendix 270.01 present.
    pub const PRIL_1: &str = "pril_1";
    /// Appendix 270.02 present.
    pub const PRIL_2: &str = "pril_2";
    /// Appendix 270.03 present.
    pub const PRIL_3: &str = "pril_3";
}

/// Returns true if `code` is a well-formed logical-field code.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.strip_prefix("LF_").is_some_and(|rest| {
        !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_uppercase() || b == b'_')
    })
}
