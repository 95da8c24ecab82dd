//! Domain-level constants.
//!
//! These constants define fiscal business rules, layout versions and the
//! SEFAZ status codes the service reacts to.

// =============================================================================
// Roles
// =============================================================================

/// Back-office operator allowed to emit and query documents
pub const ROLE_OPERATOR: &str = "operator";

/// Administrator allowed to manage fiscal profiles, cancel and inutilize
pub const ROLE_ADMIN: &str = "admin";

/// All valid role values
pub const VALID_ROLES: &[&str] = &[ROLE_OPERATOR, ROLE_ADMIN];

/// Check if a role value is valid
pub fn is_valid_role(role: &str) -> bool {
    VALID_ROLES.contains(&role)
}

// =============================================================================
// Layout
// =============================================================================

/// NF-e / NFC-e layout version
pub const NFE_LAYOUT_VERSION: &str = "4.00";

/// Event layout version (cancellation, correction letter)
pub const EVENT_LAYOUT_VERSION: &str = "1.00";

/// NF-e XML namespace
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// XML-DSig namespace
pub const DSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Application version reported in `verProc`
pub const PROCESS_VERSION: &str = "mestres-fiscal 0.1.0";

/// Description forced into the first item when emitting in homologation
pub const HOMOLOGATION_NOTICE: &str =
    "NOTA FISCAL EMITIDA EM AMBIENTE DE HOMOLOGACAO - SEM VALOR FISCAL";

// =============================================================================
// Limits
// =============================================================================

/// Maximum items per document
pub const MAX_ITEMS: usize = 990;

/// Maximum payment entries per document
pub const MAX_PAYMENTS: usize = 100;

/// Minimum justification length (cancellation, inutilization)
pub const MIN_JUSTIFICATION_LENGTH: usize = 15;

/// Maximum justification length
pub const MAX_JUSTIFICATION_LENGTH: usize = 255;

/// Minimum correction letter length
pub const MIN_CORRECTION_LENGTH: usize = 15;

/// Maximum correction letter length
pub const MAX_CORRECTION_LENGTH: usize = 1000;

/// Maximum correction letters per document
pub const MAX_CORRECTION_SEQUENCE: u32 = 20;

/// Highest document number allowed by the layout
pub const MAX_DOCUMENT_NUMBER: u32 = 999_999_999;

/// Highest series allowed by the layout
pub const MAX_SERIES: u16 = 999;

/// Exclusive bound of quantities and unit prices (qCom 11.4, vUnCom 11.10)
pub const MAX_ITEM_FACTOR: i64 = 100_000_000_000;

/// Exclusive bound of monetary amounts (13.2 fields: vProd, vDesc, vFrete, vPag, vNF)
pub const MAX_AMOUNT: i64 = 10_000_000_000_000;

/// Default cancellation window after authorization, in hours
pub const DEFAULT_CANCEL_WINDOW_HOURS: i64 = 24;

/// Event type code for cancellation
pub const EVENT_CANCELLATION: &str = "110111";

/// Event type code for correction letter
pub const EVENT_CORRECTION_LETTER: &str = "110110";

/// Fixed usage conditions text required in every correction letter
pub const CORRECTION_USAGE_CONDITIONS: &str = "A Carta de Correcao e disciplinada pelo paragrafo 1o-A do art. 7o do Convenio S/N, de 15 de dezembro de 1970 e pode ser utilizada para regularizacao de erro ocorrido na emissao de documento fiscal, desde que o erro nao esteja relacionado com: I - as variaveis que determinam o valor do imposto tais como: base de calculo, aliquota, diferenca de preco, quantidade, valor da operacao ou da prestacao; II - a correcao de dados cadastrais que implique mudanca do remetente ou do destinatario; III - a data de emissao ou de saida.";

// =============================================================================
// SEFAZ status codes (cStat)
// =============================================================================

pub const STATUS_AUTHORIZED: u16 = 100;
pub const STATUS_CANCELLATION_HOMOLOGATED: u16 = 101;
pub const STATUS_INUTILIZATION_HOMOLOGATED: u16 = 102;
pub const STATUS_BATCH_RECEIVED: u16 = 103;
pub const STATUS_BATCH_PROCESSED: u16 = 104;
pub const STATUS_BATCH_PROCESSING: u16 = 105;
pub const STATUS_BATCH_NOT_FOUND: u16 = 106;
pub const STATUS_SERVICE_RUNNING: u16 = 107;
pub const STATUS_SERVICE_PARALYZED_SHORT: u16 = 108;
pub const STATUS_SERVICE_PARALYZED: u16 = 109;
pub const STATUS_DENIED: u16 = 110;
pub const STATUS_EVENT_BATCH_PROCESSED: u16 = 128;
pub const STATUS_EVENT_REGISTERED: u16 = 135;
pub const STATUS_EVENT_REGISTERED_UNLINKED: u16 = 136;
pub const STATUS_AUTHORIZED_LATE: u16 = 150;
pub const STATUS_CANCELLATION_LATE: u16 = 155;
pub const STATUS_DUPLICATE: u16 = 204;
pub const STATUS_KEY_NOT_FOUND: u16 = 217;
pub const STATUS_DENIED_ISSUER: u16 = 301;
pub const STATUS_DENIED_RECIPIENT: u16 = 302;
pub const STATUS_DENIED_RECIPIENT_UF: u16 = 303;
pub const STATUS_DUPLICATE_DIFFERENT_KEY: u16 = 539;
pub const STATUS_EXCESS_CONSUMPTION: u16 = 656;
pub const STATUS_INTERNAL_ERROR: u16 = 999;

/// Document authorized (including late authorization)
pub fn is_authorized(code: u16) -> bool {
    matches!(code, STATUS_AUTHORIZED | STATUS_AUTHORIZED_LATE)
}

/// Document denied (uso denegado)
pub fn is_denied(code: u16) -> bool {
    matches!(
        code,
        STATUS_DENIED | STATUS_DENIED_ISSUER | STATUS_DENIED_RECIPIENT | STATUS_DENIED_RECIPIENT_UF
    )
}

/// Event registered by SEFAZ
pub fn is_event_accepted(code: u16) -> bool {
    matches!(
        code,
        STATUS_EVENT_REGISTERED | STATUS_EVENT_REGISTERED_UNLINKED | STATUS_CANCELLATION_LATE
    )
}

/// Duplicate submission, the original outcome must be recovered by key
pub fn is_duplicate(code: u16) -> bool {
    matches!(code, STATUS_DUPLICATE | STATUS_DUPLICATE_DIFFERENT_KEY)
}

/// Transient condition, the same request may be retried later
pub fn is_retryable(code: u16) -> bool {
    matches!(
        code,
        STATUS_BATCH_PROCESSING
            | STATUS_SERVICE_PARALYZED_SHORT
            | STATUS_SERVICE_PARALYZED
            | STATUS_EXCESS_CONSUMPTION
            | STATUS_INTERNAL_ERROR
    )
}
