//! Room command handlers
//!
//! Each handler validates its arguments strictly, mutates the sender's
//! avatar, broadcasts the matching event and finally feeds the condition
//! engine. A validation failure returns before anything is mutated.

use shared::avatar::{bool_field, Facing, Flash, Picture, PictureParams, Sprite};
use shared::condition::ConditionEvent;
use shared::{
    Command, MAX_CHAT_LENGTH, MAX_PICTURES, MAX_SPEED, MAX_SPRITE_INDEX, MAX_TRANSPARENCY,
};

use crate::error::{Args, CommandError, CommandResult};
use crate::room::RoomActor;
use crate::room_client::RoomClient;

/// Bound on picture coordinates and offsets
const PICTURE_COORD_LIMIT: i32 = 100_000;
const MAX_FLASH_COMPONENT: u8 = 31;
const MAX_FLASH_FRAMES: u16 = 600;
const MAX_PICTURE_DURATION: u32 = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movement {
    Walk,
    Teleport,
    Jump,
}

impl Movement {
    fn command(self) -> &'static str {
        match self {
            Movement::Walk => "m",
            Movement::Teleport => "tp",
            Movement::Jump => "jmp",
        }
    }
}

/// Parses the fifteen placement fields shared by `ap` and `mp`
fn picture_params(args: &Args, from: usize) -> Result<PictureParams, CommandError> {
    let coord = |i: usize| args.int::<i32>(from + i, -PICTURE_COORD_LIMIT, PICTURE_COORD_LIMIT);
    Ok(PictureParams {
        position: (coord(0)?, coord(1)?),
        map: (coord(2)?, coord(3)?),
        pan: (coord(4)?, coord(5)?),
        magnify: args.int(from + 6, 0, 2000)?,
        top_transparency: args.int(from + 7, 0, 100)?,
        bottom_transparency: args.int(from + 8, 0, 100)?,
        color: (
            args.int(from + 9, 0, 200)?,
            args.int(from + 10, 0, 200)?,
            args.int(from + 11, 0, 200)?,
        ),
        saturation: args.int(from + 12, 0, 200)?,
        effect_mode: args.int(from + 13, 0, 2)?,
        effect_power: args.int(from + 14, -10_000, 10_000)?,
    })
}

fn flash(args: &Args) -> Result<Flash, CommandError> {
    Ok(Flash {
        red: args.int(0, 0, MAX_FLASH_COMPONENT)?,
        green: args.int(1, 0, MAX_FLASH_COMPONENT)?,
        blue: args.int(2, 0, MAX_FLASH_COMPONENT)?,
        power: args.int(3, 0, MAX_FLASH_COMPONENT)?,
        frames: args.int(4, 0, MAX_FLASH_FRAMES)?,
    })
}

impl RoomActor {
    /// Routes one command from `client`
    pub(crate) fn dispatch(&mut self, client: &mut RoomClient, command: &Command) -> CommandResult {
        let args = &command.args;
        match command.name.as_str() {
            "m" => self.handle_move(client, args, Movement::Walk),
            "tp" => self.handle_move(client, args, Movement::Teleport),
            "jmp" => self.handle_move(client, args, Movement::Jump),
            "f" => self.handle_facing(client, args),
            "spd" => self.handle_speed(client, args),
            "spr" => self.handle_sprite(client, args),
            "sys" => self.handle_system(client, args),
            "se" => self.handle_sound(client, args),
            "fl" => self.handle_flash(client, args, false),
            "rfl" => self.handle_flash(client, args, true),
            "rrfl" => self.handle_clear_flash(client, args),
            "h" => self.handle_hidden(client, args),
            "tr" => self.handle_transparency(client, args),
            "ap" => self.handle_show_picture(client, args),
            "mp" => self.handle_move_picture(client, args),
            "rp" => self.handle_erase_picture(client, args),
            "ss" => self.handle_switch(client, args),
            "sv" => self.handle_var(client, args),
            "pm" => self.handle_previous_map(client, args),
            "say" => self.handle_say(client, args),
            _ => Err(CommandError::Unknown),
        }
    }

    fn handle_move(&mut self, client: &mut RoomClient, args: &[String], kind: Movement) -> CommandResult {
        let args = Args::exact(args, 2)?;
        let x = args.int::<u16>(0, 0, u16::MAX)?;
        let y = args.int::<u16>(1, 0, u16::MAX)?;

        let event = match kind {
            Movement::Walk => {
                client.avatar.step_to(x, y);
                ConditionEvent::CoordsChanged
            }
            Movement::Teleport => {
                client.avatar.place_at(x, y);
                ConditionEvent::Teleported
            }
            Movement::Jump => {
                client.avatar.place_at(x, y);
                ConditionEvent::CoordsChanged
            }
        };

        let message = client.event(kind.command(), &[x.to_string(), y.to_string()]);
        self.broadcast(client, message);
        self.evaluate(client, event);
        Ok(())
    }

    fn handle_facing(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let index = args.int::<u8>(0, 0, 3)?;
        let facing = Facing::from_index(index).ok_or(CommandError::BadArg {
            index: 0,
            value: index.to_string(),
        })?;
        client.avatar.facing = facing;

        let message = client.event("f", &[index.to_string()]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_speed(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let speed = args.int::<u8>(0, 0, MAX_SPEED)?;
        client.avatar.speed = speed;

        let message = client.event("spd", &[speed.to_string()]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_sprite(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 2)?;
        let name = args.str(0);
        let index = args.int::<u8>(1, 0, MAX_SPRITE_INDEX)?;
        if !self.hub.assets.sprite_allowed(name) {
            return Err(CommandError::NotAllowed(name.to_string()));
        }
        client.avatar.sprite = Some(Sprite {
            name: name.to_string(),
            index,
        });

        let message = client.event("spr", &[name.to_string(), index.to_string()]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_system(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let name = args.str(0);
        if !self.hub.assets.system_allowed(name) {
            return Err(CommandError::NotAllowed(name.to_string()));
        }
        client.avatar.system = Some(name.to_string());

        let message = client.event("sys", &[name]);
        self.broadcast(client, message);
        Ok(())
    }

    /// Sound effects are relayed but not remembered
    fn handle_sound(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 4)?;
        let name = args.str(0);
        let volume = args.int::<u8>(1, 0, 100)?;
        let tempo = args.int::<u16>(2, 10, 400)?;
        let balance = args.int::<u8>(3, 0, 100)?;
        if !self.hub.assets.sound_allowed(name) {
            return Err(CommandError::NotAllowed(name.to_string()));
        }

        let message = client.event(
            "se",
            &[
                name.to_string(),
                volume.to_string(),
                tempo.to_string(),
                balance.to_string(),
            ],
        );
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_flash(&mut self, client: &mut RoomClient, args: &[String], repeating: bool) -> CommandResult {
        let args = Args::exact(args, 5)?;
        let flash = flash(&args)?;

        let name = if repeating {
            client.avatar.repeating_flash = Some(flash);
            "rfl"
        } else {
            "fl"
        };
        let message = client.event(name, &flash.fields());
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_clear_flash(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        client.avatar.repeating_flash = None;

        let message = client.event("rrfl", &[] as &[&str]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_hidden(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let hidden = args.flag(0)?;
        client.avatar.hidden = hidden;

        let message = client.event("h", &[bool_field(hidden)]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_transparency(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let transparency = args.int::<u8>(0, 0, MAX_TRANSPARENCY)?;
        client.avatar.transparency = transparency;

        let message = client.event("tr", &[transparency.to_string()]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_show_picture(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1 + PictureParams::FIELD_COUNT + 3)?;
        let id = args.int::<u16>(0, 1, MAX_PICTURES)?;
        let params = picture_params(&args, 1)?;
        let name_index = 1 + PictureParams::FIELD_COUNT;
        let name = args.str(name_index);
        let use_transparent_color = args.flag(name_index + 1)?;
        let fixed_to_map = args.flag(name_index + 2)?;
        if !self.hub.assets.picture_allowed(name) {
            return Err(CommandError::NotAllowed(name.to_string()));
        }

        let picture = Picture {
            id,
            params,
            name: name.to_string(),
            use_transparent_color,
            fixed_to_map,
        };
        let message = client.event("ap", &picture.fields());
        if !client.avatar.show_picture(picture) {
            return Err(CommandError::Dangling("picture slot"));
        }
        self.broadcast(client, message);
        self.evaluate(client, ConditionEvent::PictureShown { name });
        Ok(())
    }

    fn handle_move_picture(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1 + PictureParams::FIELD_COUNT + 1)?;
        let id = args.int::<u16>(0, 1, MAX_PICTURES)?;
        let params = picture_params(&args, 1)?;
        let duration = args.int::<u32>(1 + PictureParams::FIELD_COUNT, 0, MAX_PICTURE_DURATION)?;

        if !client.avatar.move_picture(id, params) {
            return Err(CommandError::Dangling("picture"));
        }

        let mut fields = vec![id.to_string()];
        fields.extend(params.fields());
        fields.push(duration.to_string());
        let message = client.event("mp", &fields);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_erase_picture(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let id = args.int::<u16>(0, 1, MAX_PICTURES)?;
        if !client.avatar.erase_picture(id) {
            return Err(CommandError::Dangling("picture"));
        }

        let message = client.event("rp", &[id.to_string()]);
        self.broadcast(client, message);
        Ok(())
    }

    fn handle_switch(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 2)?;
        let id = args.int::<u32>(0, 0, u32::MAX)?;
        let value = args.flag(1)?;
        client.avatar.cache_switch(id, value);

        self.evaluate(client, ConditionEvent::SwitchChanged { id, value });
        Ok(())
    }

    fn handle_var(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 2)?;
        let id = args.int::<u32>(0, 0, u32::MAX)?;
        let value = args.int::<i32>(1, i32::MIN, i32::MAX)?;
        client.avatar.cache_var(id, value);

        self.evaluate(client, ConditionEvent::VarChanged { id, value });
        Ok(())
    }

    fn handle_previous_map(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let map_id = args.int::<u32>(0, 0, u32::MAX)?;
        client.avatar.breadcrumbs.push(map_id);

        self.evaluate(client, ConditionEvent::PreviousMapChanged { map_id });
        Ok(())
    }

    fn handle_say(&mut self, client: &mut RoomClient, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let text = args.text(0, MAX_CHAT_LENGTH)?;
        let identity = self.hub.store.identity(client.uuid())?;
        if identity.muted {
            return Err(CommandError::Muted);
        }
        if identity.name.is_none() {
            return Err(CommandError::Forbidden);
        }

        let text = self.hub.profanity.mask(text);
        let message = client.event("say", &[text]);
        self.broadcast(client, message);
        Ok(())
    }
}
