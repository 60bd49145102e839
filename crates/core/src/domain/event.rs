// Push channel wire messages

use super::invoice::InvoiceStatus;
use super::package::PackageStatus;
use serde::{Deserialize, Serialize};

/// Server -> client push message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: String, timestamp: String },

    #[serde(rename_all = "camelCase")]
    InvoiceStatusUpdate {
        invoice_id: String,
        status: InvoiceStatus,
        package_id: Option<String>,
        timestamp: String,
    },

    #[serde(rename_all = "camelCase")]
    PackageStatusUpdate {
        package_id: String,
        status: PackageStatus,
        timestamp: String,
    },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::InvoiceStatusUpdate { .. } => "invoice_status_update",
            ServerMessage::PackageStatusUpdate { .. } => "package_status_update",
        }
    }
}

/// Client -> server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    ListenInvoice { invoice_id: String },

    #[serde(rename_all = "camelCase")]
    ListenPackage { package_id: String },

    ListenAllInvoices,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoice_update_wire_shape() {
        let msg = ServerMessage::InvoiceStatusUpdate {
            invoice_id: "inv-1".into(),
            status: InvoiceStatus::Queued,
            package_id: None,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        };

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "invoice_status_update",
                "invoiceId": "inv-1",
                "status": "queued",
                "packageId": null,
                "timestamp": "2024-01-01T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_connected_wire_shape() {
        let msg = ServerMessage::Connected {
            user_id: "user-1".into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "connected");
        assert_eq!(value["userId"], "user-1");
        assert_eq!(msg.kind(), "connected");
    }

    #[test]
    fn test_client_messages_parse() {
        let listen: ClientMessage =
            serde_json::from_str(r#"{"type":"listen_invoice","invoiceId":"inv-9"}"#).unwrap();
        assert_eq!(
            listen,
            ClientMessage::ListenInvoice {
                invoice_id: "inv-9".into()
            }
        );

        let all: ClientMessage = serde_json::from_str(r#"{"type":"listen_all_invoices"}"#).unwrap();
        assert_eq!(all, ClientMessage::ListenAllInvoices);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
