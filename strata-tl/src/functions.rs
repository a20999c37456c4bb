//! RPC functions.
//!
//! Every function writes its constructor ID before its parameters and names
//! its response type through [`crate::RemoteCall::Return`].

use crate::enums;

tl_function! {
    /// [`ping`](https://core.telegram.org/mtproto/service_messages#ping-messages-pingpong)
    pub struct Ping = 0x7abe77ec -> enums::Pong {
        pub ping_id: i64,
    }
}

tl_function! {
    /// [`ping_delay_disconnect`](https://core.telegram.org/mtproto/service_messages#deferred-connection-closure-ping)
    ///
    /// Asks the server to close the connection if no further ping arrives
    /// within `disconnect_delay` seconds.
    pub struct PingDelayDisconnect = 0xf3427b8c -> enums::Pong {
        pub ping_id: i64,
        pub disconnect_delay: i32,
    }
}

pub mod updates {
    use crate::{Identifiable, RemoteCall, Serializable, enums};

    tl_function! {
        /// [`updates.getState`](https://core.telegram.org/method/updates.getState)
        pub struct GetState = 0xedd4882a -> enums::updates::State {}
    }

    /// [`updates.getDifference`](https://core.telegram.org/method/updates.getDifference)
    ///
    /// ```tl
    /// updates.getDifference#19c2f763 flags:# pts:int pts_limit:flags.1?int pts_total_limit:flags.0?int date:int qts:int qts_limit:flags.2?int = updates.Difference;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct GetDifference {
        pub pts: i32,
        pub pts_limit: Option<i32>,
        pub pts_total_limit: Option<i32>,
        pub date: i32,
        pub qts: i32,
        pub qts_limit: Option<i32>,
    }

    impl Identifiable for GetDifference {
        const CONSTRUCTOR_ID: u32 = 0x19c2f763;
    }

    impl Serializable for GetDifference {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            (if self.pts_total_limit.is_some() { 1u32 << 0 } else { 0 }
                | if self.pts_limit.is_some() { 1u32 << 1 } else { 0 }
                | if self.qts_limit.is_some() { 1u32 << 2 } else { 0 }).serialize(buf);
            self.pts.serialize(buf);
            if let Some(ref v) = self.pts_limit { v.serialize(buf); }
            if let Some(ref v) = self.pts_total_limit { v.serialize(buf); }
            self.date.serialize(buf);
            self.qts.serialize(buf);
            if let Some(ref v) = self.qts_limit { v.serialize(buf); }
        }
    }

    impl RemoteCall for GetDifference {
        type Return = enums::updates::Difference;
    }

    /// [`updates.getChannelDifference`](https://core.telegram.org/method/updates.getChannelDifference)
    ///
    /// ```tl
    /// updates.getChannelDifference#03173d78 flags:# force:flags.0?true channel:InputChannel filter:ChannelMessagesFilter pts:int limit:int = updates.ChannelDifference;
    /// ```
    #[derive(Debug)]
    #[derive(Clone, PartialEq)]
    pub struct GetChannelDifference {
        pub force: bool,
        pub channel: enums::InputChannel,
        pub filter: enums::ChannelMessagesFilter,
        pub pts: i32,
        pub limit: i32,
    }

    impl Identifiable for GetChannelDifference {
        const CONSTRUCTOR_ID: u32 = 0x03173d78;
    }

    impl Serializable for GetChannelDifference {
        fn serialize(&self, buf: &mut impl Extend<u8>) {
            Self::CONSTRUCTOR_ID.serialize(buf);
            (if self.force { 1u32 << 0 } else { 0 }).serialize(buf);
            self.channel.serialize(buf);
            self.filter.serialize(buf);
            self.pts.serialize(buf);
            self.limit.serialize(buf);
        }
    }

    impl RemoteCall for GetChannelDifference {
        type Return = enums::updates::ChannelDifference;
    }
}

pub mod users {
    use crate::enums;

    tl_function! {
        /// [`users.getUsers`](https://core.telegram.org/method/users.getUsers)
        pub struct GetUsers = 0x0d91a548 -> Vec<enums::User> {
            pub id: Vec<enums::InputUser>,
        }
    }
}

pub mod channels {
    use crate::enums;

    tl_function! {
        /// [`channels.getChannels`](https://core.telegram.org/method/channels.getChannels)
        pub struct GetChannels = 0x0a7f6bbb -> enums::messages::Chats {
            pub id: Vec<enums::InputChannel>,
        }
    }
}
