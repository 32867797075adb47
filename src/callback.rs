//! Callback-button payloads parsed into a closed command set. Handlers
//! dispatch on the enum, never on raw string prefixes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    BackToMenu,
    AdminAdd,
    AdminList,
    AdminEdit,
    AdminDelete,
    ChooseClient(i64),
    ChooseServiceType(String),
    ChooseSubscription(i64),
    ChooseField(String),
    FilterMonth(Option<String>),
    PagePrev,
    PageNext,
    ConfirmDelete,
    CancelDelete,
    PayNow(i64),
    Approve(i64),
    Reject(i64),
}

impl Callback {
    /// Renders the payload string placed on an inline button.
    pub fn encode(&self) -> String {
        match self {
            Callback::BackToMenu => "back_to_menu".into(),
            Callback::AdminAdd => "admin_add".into(),
            Callback::AdminList => "admin_list".into(),
            Callback::AdminEdit => "admin_edit".into(),
            Callback::AdminDelete => "admin_delete".into(),
            Callback::ChooseClient(id) => format!("client_{}", id),
            Callback::ChooseServiceType(st) => format!("stype_{}", st),
            Callback::ChooseSubscription(id) => format!("sub_{}", id),
            Callback::ChooseField(col) => format!("field_{}", col),
            Callback::FilterMonth(None) => "filter_all".into(),
            Callback::FilterMonth(Some(m)) => format!("filter_{}", m),
            Callback::PagePrev => "page_prev".into(),
            Callback::PageNext => "page_next".into(),
            Callback::ConfirmDelete => "confirm_delete".into(),
            Callback::CancelDelete => "cancel_delete".into(),
            Callback::PayNow(id) => format!("pay_{}", id),
            Callback::Approve(id) => format!("approve_{}", id),
            Callback::Reject(id) => format!("reject_{}", id),
        }
    }

    pub fn parse(data: &str) -> Option<Callback> {
        match data {
            "back_to_menu" => return Some(Callback::BackToMenu),
            "admin_add" => return Some(Callback::AdminAdd),
            "admin_list" => return Some(Callback::AdminList),
            "admin_edit" => return Some(Callback::AdminEdit),
            "admin_delete" => return Some(Callback::AdminDelete),
            "filter_all" => return Some(Callback::FilterMonth(None)),
            "page_prev" => return Some(Callback::PagePrev),
            "page_next" => return Some(Callback::PageNext),
            "confirm_delete" => return Some(Callback::ConfirmDelete),
            "cancel_delete" => return Some(Callback::CancelDelete),
            _ => {}
        }
        if let Some(rest) = data.strip_prefix("client_") {
            return rest.parse().ok().map(Callback::ChooseClient);
        }
        if let Some(rest) = data.strip_prefix("stype_") {
            return Some(Callback::ChooseServiceType(rest.to_string()));
        }
        if let Some(rest) = data.strip_prefix("sub_") {
            return rest.parse().ok().map(Callback::ChooseSubscription);
        }
        if let Some(rest) = data.strip_prefix("field_") {
            return Some(Callback::ChooseField(rest.to_string()));
        }
        if let Some(rest) = data.strip_prefix("filter_") {
            return Some(Callback::FilterMonth(Some(rest.to_string())));
        }
        if let Some(rest) = data.strip_prefix("pay_") {
            return rest.parse().ok().map(Callback::PayNow);
        }
        if let Some(rest) = data.strip_prefix("approve_") {
            return rest.parse().ok().map(Callback::Approve);
        }
        if let Some(rest) = data.strip_prefix("reject_") {
            return rest.parse().ok().map(Callback::Reject);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::Callback;

    #[test]
    fn round_trips_every_variant() {
        let all = vec![
            Callback::BackToMenu,
            Callback::AdminAdd,
            Callback::AdminList,
            Callback::AdminEdit,
            Callback::AdminDelete,
            Callback::ChooseClient(42),
            Callback::ChooseServiceType("vps".into()),
            Callback::ChooseSubscription(7),
            Callback::ChooseField("price_sell".into()),
            Callback::FilterMonth(None),
            Callback::FilterMonth(Some("2025-03".into())),
            Callback::PagePrev,
            Callback::PageNext,
            Callback::ConfirmDelete,
            Callback::CancelDelete,
            Callback::PayNow(9),
            Callback::Approve(13),
            Callback::Reject(13),
        ];
        for cb in all {
            assert_eq!(Callback::parse(&cb.encode()), Some(cb));
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert_eq!(Callback::parse(""), None);
        assert_eq!(Callback::parse("approve_"), None);
        assert_eq!(Callback::parse("approve_abc"), None);
        assert_eq!(Callback::parse("unknown_9"), None);
    }
}
